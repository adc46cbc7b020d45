use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::config::ControlConfig;
use super::error::ControlError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TorControl {
    stream: BufReader<TcpStream>,
}

impl TorControl {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ControlError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("control port {host}:{port} did not answer"),
                )
            })??;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Without a password this relies on the control port allowing null auth.
    pub async fn authenticate(&mut self, password: Option<&str>) -> Result<(), ControlError> {
        let line = match password {
            Some(password) => format!("AUTHENTICATE {}", quote(password)),
            None => "AUTHENTICATE".to_string(),
        };
        self.command("AUTHENTICATE", &line).await.map(|_| ())
    }

    pub async fn use_bridges(&mut self, bridges: &[String]) -> Result<(), ControlError> {
        if bridges.is_empty() {
            return Ok(());
        }
        let mut line = "SETCONF UseBridges=1".to_string();
        for bridge in bridges {
            line.push_str(" Bridge=");
            line.push_str(&quote(bridge));
        }
        self.command("SETCONF", &line).await.map(|_| ())
    }

    pub async fn new_identity(&mut self) -> Result<(), ControlError> {
        self.command("SIGNAL NEWNYM", "SIGNAL NEWNYM").await.map(|_| ())
    }

    /// Sends one command and reads its reply up to the final `NNN ` line.
    /// `label` is what error messages show, so secrets stay out of logs.
    async fn command(&mut self, label: &str, line: &str) -> Result<Vec<String>, ControlError> {
        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;

        let mut reply = Vec::new();
        loop {
            let mut buf = String::new();
            if self.stream.read_line(&mut buf).await? == 0 {
                return Err(ControlError::Closed);
            }
            let text = buf.trim_end().to_string();
            let is_final = text.as_bytes().get(3) == Some(&b' ') || text.len() == 3;
            reply.push(text);
            if is_final {
                break;
            }
        }

        let status_ok = reply
            .last()
            .map(|last| last.starts_with("250"))
            .unwrap_or(false);
        if !status_ok {
            return Err(ControlError::Rejected {
                command: label.to_string(),
                reply: reply.join(" | "),
            });
        }
        debug!(command = label, "control port accepted command");
        Ok(reply)
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub async fn rotate_circuit(config: &ControlConfig) -> Result<(), ControlError> {
    let mut control = TorControl::connect(&config.host, config.port).await?;
    control.authenticate(config.password.as_deref()).await?;
    control.use_bridges(&config.bridges).await?;
    control.new_identity().await?;
    info!(
        host = %config.host,
        port = config.port,
        bridges = config.bridges.len(),
        "tor identity rotated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn fake_control(replies: Vec<&'static str>) -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_task = seen.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(socket);
            for reply in replies {
                let mut line = String::new();
                if stream.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                seen_task.lock().unwrap().push(line.trim_end().to_string());
                stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
            }
        });
        (port, seen)
    }

    fn config(port: u16, password: Option<&str>, bridges: Vec<String>) -> ControlConfig {
        ControlConfig {
            host: "127.0.0.1".to_string(),
            port,
            password: password.map(ToString::to_string),
            bridges,
        }
    }

    #[tokio::test]
    async fn rotation_sends_expected_commands() {
        let (port, seen) = fake_control(vec!["250 OK\r\n", "250 OK\r\n", "250 OK\r\n"]).await;
        let cfg = config(
            port,
            Some("s3cr\"et"),
            vec!["obfs4 1.2.3.4:443 cert=abc".to_string()],
        );
        rotate_circuit(&cfg).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                r#"AUTHENTICATE "s3cr\"et""#.to_string(),
                r#"SETCONF UseBridges=1 Bridge="obfs4 1.2.3.4:443 cert=abc""#.to_string(),
                "SIGNAL NEWNYM".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn bridges_are_optional() {
        let (port, seen) = fake_control(vec!["250 OK\r\n", "250 OK\r\n"]).await;
        rotate_circuit(&config(port, None, Vec::new())).await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["AUTHENTICATE", "SIGNAL NEWNYM"]);
    }

    #[tokio::test]
    async fn multi_line_reply_is_read_to_the_end() {
        let (port, _) = fake_control(vec!["250-first\r\n250-second\r\n250 OK\r\n"]).await;
        let mut control = TorControl::connect("127.0.0.1", port).await.unwrap();
        let reply = control.command("GETINFO", "GETINFO version").await.unwrap();
        assert_eq!(reply.len(), 3);
    }

    #[tokio::test]
    async fn rejected_authentication_hides_password() {
        let (port, _) = fake_control(vec!["515 Authentication failed\r\n"]).await;
        let err = rotate_circuit(&config(port, Some("hunter2"), Vec::new()))
            .await
            .unwrap_err();
        match err {
            ControlError::Rejected { command, reply } => {
                assert_eq!(command, "AUTHENTICATE");
                assert!(reply.starts_with("515"));
                assert!(!reply.contains("hunter2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_port_is_an_io_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = TorControl::connect("127.0.0.1", port).await.err().unwrap();
        assert!(matches!(err, ControlError::Io(_)));
    }
}
