use axum::http::HeaderMap;

/// Authorizes an incoming RPC request. The HTTP layer calls this once per
/// request before dispatching to a handler; swap implementations to change
/// how access to the SMS object model is gated without touching routes.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

/// No authentication at all. Only appropriate when the RPC surface is bound
/// to a trusted interface.
pub struct AllowAllAuthorizer;
impl Authorizer for AllowAllAuthorizer {
    fn authorize(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires `Authorization: Bearer <token>` matching a fixed, configured
/// token.
pub struct BearerTokenAuthorizer {
    token: String,
}
impl BearerTokenAuthorizer {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}
impl Authorizer for BearerTokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        let Some(auth_header) = headers.get("authorization") else {
            return false;
        };
        let Ok(auth_str) = auth_header.to_str() else {
            return false;
        };

        let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
        token == self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn allow_all_always_authorizes() {
        assert!(AllowAllAuthorizer.authorize(&HeaderMap::new()));
    }

    #[test]
    fn bearer_token_requires_matching_token() {
        let authorizer = BearerTokenAuthorizer::new("secret".to_string());
        assert!(authorizer.authorize(&headers_with("Bearer secret")));
        assert!(!authorizer.authorize(&headers_with("Bearer wrong")));
        assert!(!authorizer.authorize(&HeaderMap::new()));
    }

    #[test]
    fn bearer_token_accepts_bare_token_without_prefix() {
        let authorizer = BearerTokenAuthorizer::new("secret".to_string());
        assert!(authorizer.authorize(&headers_with("secret")));
    }
}
