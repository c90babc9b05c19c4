use std::time::{SystemTime, UNIX_EPOCH};
use serde_json::json;
use once_cell::sync::Lazy;

// Shared test context. These tests drive a running server; start one with
// OTP_DEV_RETURN=true before un-ignoring them.
struct TestContext {
    client: reqwest::Client,
    base_url: String,
}

static BASE_URL: Lazy<String> =
    Lazy::new(|| std::env::var("TEST_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()));

impl TestContext {
    fn new() -> Self {
        Self {
            client: reqwest::Client::builder().build().unwrap(),
            base_url: BASE_URL.clone(),
        }
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    #[ignore = "requires a running server with OTP_DEV_RETURN=true"]
    async fn register_login_otp_and_profile_flow() {
        let context = TestContext::new();
        let timestamp = TestContext::get_timestamp();
        let username = format!("testuser_{}", timestamp);

        // Step 1: registration
        let reg_response = context
            .client
            .post(format!("{}/api/auth/register", context.base_url))
            .json(&json!({
                "name": "Test User",
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "SecurePass123!@#",
                "phone": "+91 98765 43210"
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(reg_response.status().as_u16(), 201, "Registration failed");

        // Step 2: login with the correct password starts an OTP challenge
        // for the default role.
        let login_response = context
            .client
            .post(format!("{}/api/auth/login", context.base_url))
            .json(&json!({
                "username": username,
                "password": "SecurePass123!@#"
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(login_response.status().as_u16(), 200, "Login failed");
        let login_body: Value = login_response.json().await.unwrap();
        assert_eq!(login_body["requires_otp"], true);
        let otp = login_body["otp"]
            .as_str()
            .expect("dev mode should echo the OTP")
            .to_string();
        assert_eq!(otp.len(), 6);

        // Step 3: completing the challenge yields a bearer token.
        let otp_response = context
            .client
            .post(format!("{}/api/auth/verify-otp", context.base_url))
            .json(&json!({ "username": username, "code": otp }))
            .send()
            .await
            .unwrap();

        assert_eq!(otp_response.status().as_u16(), 200, "OTP verification failed");
        let otp_body: Value = otp_response.json().await.unwrap();
        let token = otp_body["token"].as_str().unwrap().to_string();

        // Step 4: a second submit of the same code is refused (single use).
        let replay = context
            .client
            .post(format!("{}/api/auth/verify-otp", context.base_url))
            .json(&json!({ "username": username, "code": otp }))
            .send()
            .await
            .unwrap();
        assert_eq!(replay.status().as_u16(), 401, "OTP replay should be refused");

        // Step 5: the token authenticates profile reads.
        let profile = context
            .client
            .get(format!("{}/api/profile", context.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(profile.status().as_u16(), 200);
        let profile_body: Value = profile.json().await.unwrap();
        assert_eq!(profile_body["username"], username.as_str());
        assert_eq!(profile_body["role"], "user");
        assert_eq!(
            profile_body["email"],
            format!("{}@example.com", username).as_str()
        );

        // Step 6: a role smuggled into the update payload is ignored.
        let update = context
            .client
            .put(format!("{}/api/profile", context.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "name": "Renamed User",
                "role": "admin",
                "id": "00000000-0000-0000-0000-000000000000"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(update.status().as_u16(), 200);
        let updated_body: Value = update.json().await.unwrap();
        assert_eq!(updated_body["name"], "Renamed User");
        assert_eq!(updated_body["role"], "user", "role must be immutable here");

        // Step 7: logout ends the session; the token stops working even
        // though the JWT itself is still days from its nominal expiry.
        let logout = context
            .client
            .post(format!("{}/api/auth/logout", context.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(logout.status().as_u16(), 200);

        let after_logout = context
            .client
            .get(format!("{}/api/profile", context.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(after_logout.status().as_u16(), 401);
        let after_body: Value = after_logout.json().await.unwrap();
        assert_eq!(after_body["code"], "SESSION_EXPIRED");
    }

    #[tokio::test]
    #[ignore = "requires a running server"]
    async fn wrong_passwords_count_down_to_a_lockout() {
        let context = TestContext::new();
        let timestamp = TestContext::get_timestamp();
        let username = format!("lockout_{}", timestamp);

        let reg = context
            .client
            .post(format!("{}/api/auth/register", context.base_url))
            .json(&json!({
                "name": "Lockout Probe",
                "username": username,
                "password": "SecurePass123!@#"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(reg.status().as_u16(), 201);

        // Nine misses leave one attempt.
        let mut last_body = Value::Null;
        for _ in 0..9 {
            let resp = context
                .client
                .post(format!("{}/api/auth/login", context.base_url))
                .json(&json!({ "username": username, "password": "wrong-password" }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status().as_u16(), 401);
            last_body = resp.json().await.unwrap();
        }
        assert!(
            last_body["error"]
                .as_str()
                .unwrap()
                .contains("1 attempts remaining")
        );

        // The tenth locks the account.
        let tenth = context
            .client
            .post(format!("{}/api/auth/login", context.base_url))
            .json(&json!({ "username": username, "password": "wrong-password" }))
            .send()
            .await
            .unwrap();
        assert_eq!(tenth.status().as_u16(), 403);
        let tenth_body: Value = tenth.json().await.unwrap();
        assert_eq!(tenth_body["code"], "ACCOUNT_LOCKED");

        // Even the correct password is refused while locked.
        let while_locked = context
            .client
            .post(format!("{}/api/auth/login", context.base_url))
            .json(&json!({ "username": username, "password": "SecurePass123!@#" }))
            .send()
            .await
            .unwrap();
        assert_eq!(while_locked.status().as_u16(), 403);
    }

    #[tokio::test]
    #[ignore = "requires a running server"]
    async fn anonymous_whoami_is_not_rejected() {
        let context = TestContext::new();

        let resp = context
            .client
            .get(format!("{}/api/auth/whoami", context.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["authenticated"], false);

        // Same endpoint with a garbage token still answers anonymously.
        let resp = context
            .client
            .get(format!("{}/api/auth/whoami", context.base_url))
            .bearer_auth("not.a.token")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["authenticated"], false);
    }
}
