use axum::http;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    let auth_header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header".to_string())?;

    Ok(auth_str
        .strip_prefix("Bearer ")
        .unwrap_or(auth_str)
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn strips_the_bearer_prefix() {
        let req = Request::builder()
            .header("Authorization", "Bearer abc123")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc123");
    }

    #[test]
    fn missing_header_is_an_error() {
        let req = Request::builder().body(()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }
}
