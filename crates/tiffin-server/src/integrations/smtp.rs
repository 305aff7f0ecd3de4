// SPDX-License-Identifier: Apache-2.0

//! Minimal SMTP submission client. Speaks just enough of the protocol
//! to hand one message to a relay: EHLO, optional AUTH LOGIN, MAIL
//! FROM, RCPT TO, DATA, QUIT. No TLS; point it at a local relay or a
//! dev sink like mailpit.

use crate::integrations::{IntegrationError, Mailer};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::instrument;

pub struct SmtpMailer {
    host: String,
    port: u16,
    from: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl SmtpMailer {
    #[must_use]
    pub fn new(
        host: String,
        port: u16,
        from: String,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            host,
            port,
            from,
            credentials,
            timeout: Duration::from_secs(10),
        }
    }

    async fn submit(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| IntegrationError(format!("smtp connect failed: {e}")))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        expect_reply(&mut reader, 220).await?;

        send_line(&mut write_half, "EHLO tiffin").await?;
        expect_reply(&mut reader, 250).await?;

        if let Some((username, password)) = &self.credentials {
            send_line(&mut write_half, "AUTH LOGIN").await?;
            expect_reply(&mut reader, 334).await?;
            send_line(&mut write_half, &STANDARD.encode(username)).await?;
            expect_reply(&mut reader, 334).await?;
            send_line(&mut write_half, &STANDARD.encode(password)).await?;
            expect_reply(&mut reader, 235).await?;
        }

        send_line(&mut write_half, &format!("MAIL FROM:<{}>", self.from)).await?;
        expect_reply(&mut reader, 250).await?;
        send_line(&mut write_half, &format!("RCPT TO:<{to}>")).await?;
        expect_reply(&mut reader, 250).await?;

        send_line(&mut write_half, "DATA").await?;
        expect_reply(&mut reader, 354).await?;
        let message = format!(
            "From: <{}>\r\nTo: <{}>\r\nSubject: {}\r\n\r\n{}\r\n.",
            self.from, to, subject, body
        );
        send_line(&mut write_half, &message).await?;
        expect_reply(&mut reader, 250).await?;

        send_line(&mut write_half, "QUIT").await?;
        // Relays close after QUIT; the 221 is not worth waiting on.
        Ok(())
    }
}

async fn send_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) -> Result<(), IntegrationError> {
    write_half
        .write_all(line.as_bytes())
        .await
        .map_err(|e| IntegrationError(format!("smtp write failed: {e}")))?;
    write_half
        .write_all(b"\r\n")
        .await
        .map_err(|e| IntegrationError(format!("smtp write failed: {e}")))
}

/// Reads one SMTP reply, skipping `NNN-` continuation lines, and checks
/// the final status code.
async fn expect_reply(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    expected: u16,
) -> Result<(), IntegrationError> {
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| IntegrationError(format!("smtp read failed: {e}")))?;
        if read == 0 {
            return Err(IntegrationError("smtp connection closed".to_string()));
        }
        if line.len() >= 4 && line.as_bytes()[3] == b'-' {
            continue;
        }
        let code: u16 = line
            .get(..3)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| IntegrationError(format!("smtp malformed reply: {}", line.trim())))?;
        if code != expected {
            return Err(IntegrationError(format!(
                "smtp expected {expected}, got: {}",
                line.trim()
            )));
        }
        return Ok(());
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(name = "mail_send", skip(self, subject, body))]
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError> {
        match tokio::time::timeout(self.timeout, self.submit(to, subject, body)).await {
            Ok(result) => result,
            Err(_) => Err(IntegrationError("smtp dialogue timed out".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn sink_smtp(listener: TcpListener) -> (String, String) {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        write_half.write_all(b"220 sink ready\r\n").await.expect("greet");
        let mut transcript = String::new();
        let mut message = String::new();
        let mut in_data = false;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.expect("read") == 0 {
                break;
            }
            if in_data {
                if line.trim_end() == "." {
                    in_data = false;
                    write_half.write_all(b"250 queued\r\n").await.expect("reply");
                } else {
                    message.push_str(&line);
                }
                continue;
            }
            transcript.push_str(&line);
            let verb = line.trim_end().to_ascii_uppercase();
            if verb.starts_with("EHLO") {
                write_half
                    .write_all(b"250-sink\r\n250 OK\r\n")
                    .await
                    .expect("reply");
            } else if verb == "DATA" {
                in_data = true;
                write_half.write_all(b"354 go ahead\r\n").await.expect("reply");
            } else if verb == "QUIT" {
                // The client does not wait for the 221 and may be gone.
                let _ = write_half.write_all(b"221 bye\r\n").await;
                break;
            } else {
                write_half.write_all(b"250 OK\r\n").await.expect("reply");
            }
        }
        (transcript, message)
    }

    #[tokio::test]
    async fn submits_one_message_through_the_dialogue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let sink = tokio::spawn(sink_smtp(listener));

        let mailer = SmtpMailer::new(
            "127.0.0.1".to_string(),
            port,
            "no-reply@tiffin.example".to_string(),
            None,
        );
        mailer
            .send("eater@example.com", "Your tiffin order", "It is on the way.")
            .await
            .expect("send");

        let (transcript, message) = sink.await.expect("sink");
        assert!(transcript.contains("MAIL FROM:<no-reply@tiffin.example>"));
        assert!(transcript.contains("RCPT TO:<eater@example.com>"));
        assert!(message.contains("Subject: Your tiffin order"));
        assert!(message.contains("It is on the way."));
    }
}
