use std::sync::Arc;
use tonic::{service::Interceptor, Request, Status};

/// A tonic interceptor which checks the `authorization: Bearer <token>` header.
///
/// With no token configured every request is let through.
#[derive(Clone, Default)]
pub struct BearerAuth {
    token: Option<Arc<str>>,
}

impl BearerAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, req: Request<()>) -> Result<Request<()>, Status> {
        let expected = match &self.token {
            Some(token) => token,
            None => return Ok(req),
        };
        let header = req
            .metadata()
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("Request missing bearer token"))?;
        let header = header
            .to_str()
            .map_err(|_| Status::unauthenticated("Malformed authorization header"))?;
        match header.strip_prefix("Bearer ") {
            Some(token) if token == &**expected => Ok(req),
            _ => Err(Status::unauthenticated("Invalid bearer token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(header: Option<&str>) -> Request<()> {
        let mut req = Request::new(());
        if let Some(header) = header {
            req.metadata_mut()
                .insert("authorization", header.parse().unwrap());
        }
        req
    }

    #[test]
    fn no_token_configured_lets_everything_through() {
        let mut auth = BearerAuth::new(None);
        assert!(auth.call(request_with(None)).is_ok());
        let mut auth = BearerAuth::new(Some(String::new()));
        assert!(auth.call(request_with(None)).is_ok());
    }

    #[test]
    fn matching_token() {
        let mut auth = BearerAuth::new(Some("s3cret".into()));
        assert!(auth.call(request_with(Some("Bearer s3cret"))).is_ok());
    }

    #[test]
    fn missing_or_wrong_token() {
        let mut auth = BearerAuth::new(Some("s3cret".into()));
        for header in [None, Some("Bearer nope"), Some("s3cret"), Some("Basic s3cret")] {
            let status = auth.call(request_with(header)).unwrap_err();
            assert_eq!(status.code(), tonic::Code::Unauthenticated);
        }
    }
}
