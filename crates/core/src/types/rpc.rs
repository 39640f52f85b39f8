use serde::{Deserialize, Serialize};
use thiserror::Error;

#[allow(clippy::enum_variant_names)]
#[derive(Clone, Error, Debug, PartialEq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("InternalError: {0}")]
    InternalError(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse<T> {
    Ok(T),
    Err(RpcError),
}

impl<T> From<RpcResponse<T>> for Result<T, RpcError> {
    fn from(response: RpcResponse<T>) -> Self {
        match response {
            RpcResponse::Ok(v) => Ok(v),
            RpcResponse::Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_format() {
        let ok: RpcResponse<Vec<u32>> = serde_json::from_str(r#"{"Ok":[1,2]}"#).unwrap();
        let res: Result<Vec<u32>, RpcError> = ok.into();
        assert_eq!(res, Ok(vec![1, 2]));

        let err: RpcResponse<()> =
            serde_json::from_str(r#"{"Err":{"NotFound":"nb:cid:UUID:1"}}"#).unwrap();
        let res: Result<(), RpcError> = err.into();
        assert_eq!(res, Err(RpcError::NotFound("nb:cid:UUID:1".to_string())));
    }
}
