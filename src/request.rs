use crate::error::TokenExchangeError;
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::tokens::TokenResponse;

pub(crate) const USER_AGENT: &str = concat!("ivao-discord-link/", env!("CARGO_PKG_VERSION"));

/// Build a form-encoded POST request.
/// Sets Content-Type, Accept: application/json and User-Agent.
pub fn create_form_request(endpoint: &str, body: &[(&str, &str)]) -> HttpRequest {
    let encoded_body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(body)
        .finish();

    HttpRequest {
        method: HttpMethod::Post,
        url: endpoint.to_string(),
        headers: vec![
            (
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ],
        body: encoded_body.into_bytes(),
    }
}

/// Send a token request and interpret the response.
///
/// The body is decoded whatever the status, because providers report
/// failures in-body:
/// - JSON with a string `error` -> `Err(Provider { .. })`
/// - JSON on a 2xx status -> `Ok(TokenResponse)`
/// - anything else -> `Err(UnexpectedBody { .. })`
pub async fn send_token_request(
    client: &(impl HttpClient + ?Sized),
    request: HttpRequest,
) -> Result<TokenResponse, TokenExchangeError> {
    let response: HttpResponse = client
        .send(request)
        .await
        .map_err(TokenExchangeError::Transport)?;

    let unexpected = || TokenExchangeError::UnexpectedBody {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    };

    let json: serde_json::Value =
        serde_json::from_slice(&response.body).map_err(|_| unexpected())?;

    if let Some(code) = json.get("error").and_then(|e| e.as_str()) {
        return Err(TokenExchangeError::Provider {
            code: code.to_string(),
            description: json
                .get("error_description")
                .and_then(|v| v.as_str())
                .map(String::from),
        });
    }

    if !response.is_success() {
        return Err(unexpected());
    }

    Ok(TokenResponse::new(json))
}


#[cfg(test)]
mod tests {
    use super::testing::{MockHttpClient, json_response};
    use super::*;

    #[test]
    fn create_form_request_sets_correct_headers() {
        let request = create_form_request("https://example.com/token", &[]);

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://example.com/token");
        assert_eq!(
            request.header_value("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.header_value("Accept"), Some("application/json"));
        assert_eq!(request.header_value("User-Agent"), Some(USER_AGENT));
    }

    #[test]
    fn create_form_request_url_encodes_body() {
        let request = create_form_request(
            "https://example.com/token",
            &[("grant_type", "authorization_code"), ("code", "abc 123&foo=bar")],
        );
        let body_str = String::from_utf8(request.body).unwrap();

        assert_eq!(
            body_str,
            "grant_type=authorization_code&code=abc+123%26foo%3Dbar"
        );
    }

    #[tokio::test]
    async fn success_200_yields_token_response() {
        let client = MockHttpClient::new(vec![json_response(
            200,
            serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "token_type": "Bearer"
            }),
        )]);

        let request = create_form_request("https://example.com/token", &[]);
        let tokens = send_token_request(&client, request).await.unwrap();

        assert_eq!(tokens.access_token().unwrap(), "at");
        assert_eq!(tokens.refresh_token().unwrap(), "rt");
    }

    #[tokio::test]
    async fn in_body_error_on_200_is_provider_error() {
        let client = MockHttpClient::new(vec![json_response(
            200,
            serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Refresh token revoked"
            }),
        )]);

        let request = create_form_request("https://example.com/token", &[]);
        let err = send_token_request(&client, request).await.unwrap_err();

        match err {
            TokenExchangeError::Provider { code, description } => {
                assert_eq!(code, "invalid_grant");
                assert_eq!(description.as_deref(), Some("Refresh token revoked"));
            }
            other => panic!("Expected Provider, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_body_error_on_400_is_provider_error() {
        let client = MockHttpClient::new(vec![json_response(
            400,
            serde_json::json!({ "error": "invalid_client" }),
        )]);

        let request = create_form_request("https://example.com/token", &[]);
        let err = send_token_request(&client, request).await.unwrap_err();

        assert!(matches!(
            err,
            TokenExchangeError::Provider { ref code, description: None } if code == "invalid_client"
        ));
    }

    #[tokio::test]
    async fn non_json_body_is_unexpected() {
        let client = MockHttpClient::new(vec![HttpResponse {
            status: 200,
            body: b"<html>oops</html>".to_vec(),
        }]);

        let request = create_form_request("https://example.com/token", &[]);
        let err = send_token_request(&client, request).await.unwrap_err();

        match err {
            TokenExchangeError::UnexpectedBody { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, "<html>oops</html>");
            }
            other => panic!("Expected UnexpectedBody, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn json_without_error_on_500_is_unexpected() {
        let client = MockHttpClient::new(vec![json_response(
            500,
            serde_json::json!({ "message": "down" }),
        )]);

        let request = create_form_request("https://example.com/token", &[]);
        let err = send_token_request(&client, request).await.unwrap_err();

        assert!(matches!(
            err,
            TokenExchangeError::UnexpectedBody { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let client = MockHttpClient::with_failures(vec![None]);

        let request = create_form_request("https://example.com/token", &[]);
        let err = send_token_request(&client, request).await.unwrap_err();

        assert!(matches!(err, TokenExchangeError::Transport(_)));
    }
}
