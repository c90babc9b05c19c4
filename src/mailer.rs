/// Outbound mail collaborator for one-time codes.
///
/// Delivery is out-of-band and best-effort: a failure here never blocks the
/// login flow. The default implementation logs the send; wiring an actual
/// SMTP relay is a deployment concern.
pub struct Mailer {
    from: String,
}

impl Mailer {
    /// Creates a new `Mailer`.
    pub fn new(from: String) -> Self {
        Self { from }
    }

    /// Sends a one-time code to a user.
    pub async fn send_otp(&self, to: Option<&str>, username: &str, code: &str) {
        match to {
            Some(address) => {
                tracing::info!(
                    "📧 OTP mail queued from {} to {} (user {}, code ends ..{})",
                    self.from,
                    address,
                    username,
                    &code[code.len().saturating_sub(2)..],
                );
            }
            None => {
                tracing::warn!(
                    "📧 No email on file for user {}, OTP not delivered out-of-band",
                    username
                );
            }
        }
    }
}
