//! Wire messages for `ratelimit.v1.RatelimitService`.
//!
//! Kept in step with `proto/ratelimit/v1/service.proto` by hand.

/// GRPC path of the unary `Ratelimit` method.
pub const RATELIMIT_PATH: &str = "/ratelimit.v1.RatelimitService/Ratelimit";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentRequest {
    #[prost(string, tag = "1")]
    pub identifier: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub limit: i64,
    /// Window length in milliseconds
    #[prost(int64, tag = "3")]
    pub duration: i64,
    #[prost(int64, tag = "4")]
    pub cost: i64,
    #[prost(string, tag = "5")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentResponse {
    #[prost(int64, tag = "1")]
    pub limit: i64,
    #[prost(int64, tag = "2")]
    pub remaining: i64,
    /// Epoch milliseconds when the window ends
    #[prost(int64, tag = "3")]
    pub reset: i64,
    #[prost(bool, tag = "4")]
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_request_wire_encoding() {
        let request = AgentRequest {
            identifier: "k".to_string(),
            limit: 10,
            duration: 1000,
            cost: 1,
            name: "n".to_string(),
        };
        let bytes = request.encode_to_vec();
        // field 1 (len-delimited) "k", field 2 varint 10, field 3 varint 1000, field 4 varint 1, field 5 "n"
        assert_eq!(
            bytes,
            vec![0x0a, 0x01, b'k', 0x10, 0x0a, 0x18, 0xe8, 0x07, 0x20, 0x01, 0x2a, 0x01, b'n']
        );
    }

    #[test]
    fn test_empty_response_decodes_to_defaults() {
        let response = AgentResponse::decode(&b""[..]).unwrap();
        assert_eq!(response, AgentResponse::default());
        assert!(!response.success);
    }
}
