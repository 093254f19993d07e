//! One authenticated RouterOS API session
//!
//! Commands are strictly sequential: a command is written, then replies are
//! read until its `!done`. Tags are not used.

use crate::proto::{self, Attributes, ReplyKind};
use mtsync_core::{Error, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::STORE_NAME;

/// A RouterOS API session over any byte stream
pub struct ApiConnection<S> {
    stream: S,
}

impl<S> ApiConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream. Call [`login`](Self::login) before anything else.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Plain-text login (RouterOS 6.43 and later)
    ///
    /// A `!trap` from the router means the credentials were refused.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let words = [
            "/login".to_string(),
            format!("=name={}", username),
            format!("=password={}", password),
        ];

        match self.run(&words).await {
            Ok(rows) => {
                // Pre-6.43 routers answer with an MD5 challenge instead
                if rows.iter().any(|row| row.contains_key("ret")) {
                    return Err(Error::auth(
                        "router requested legacy challenge login, which is not supported",
                    ));
                }
                Ok(())
            }
            Err(Error::Store { message, .. }) => Err(Error::auth(message)),
            Err(e) => Err(e),
        }
    }

    /// Run one command and collect its `!re` rows
    ///
    /// A `!trap` becomes `Error::Store` once the trailing `!done` has been
    /// consumed, so the session stays usable. A `!fatal` or a malformed
    /// reply is a transport error.
    pub async fn run<W: AsRef<str>>(&mut self, words: &[W]) -> Result<Vec<Attributes>> {
        proto::write_sentence(&mut self.stream, words).await?;

        let mut rows = Vec::new();
        let mut trap: Option<String> = None;

        loop {
            let reply = proto::read_reply(&mut self.stream).await?;
            match reply.kind {
                ReplyKind::Re => rows.push(reply.attributes),
                ReplyKind::Empty => {}
                ReplyKind::Trap => {
                    if trap.is_none() {
                        trap = Some(reply.message());
                    }
                }
                ReplyKind::Fatal => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        format!("router closed the session: {}", reply.message()),
                    )));
                }
                ReplyKind::Done => {
                    // `/login` on old routers returns data on `!done`
                    if !reply.attributes.is_empty() {
                        rows.push(reply.attributes);
                    }
                    break;
                }
            }
        }

        match trap {
            Some(message) => Err(Error::store(STORE_NAME, message)),
            None => Ok(rows),
        }
    }
}

impl<S> std::fmt::Debug for ApiConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConnection").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::encode_sentence;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_login_ok() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/login", "=name=admin", "=password=secret"]))
            .read(&encode_sentence(&["!done"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        conn.login("admin", "secret").await.unwrap();
    }

    #[tokio::test]
    async fn test_login_refused_is_authentication_error() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/login", "=name=admin", "=password=wrong"]))
            .read(&encode_sentence(&[
                "!trap",
                "=message=invalid user name or password (6)",
            ]))
            .read(&encode_sentence(&["!done"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        let err = conn.login("admin", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
        assert!(err.to_string().contains("invalid user name or password"));
    }

    #[tokio::test]
    async fn test_login_legacy_challenge_rejected() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/login", "=name=admin", "=password=secret"]))
            .read(&encode_sentence(&["!done", "=ret=93b438ec9b80057c06dd9fe67d56aa9a"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        let err = conn.login("admin", "secret").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_run_collects_rows() {
        let mock = Builder::new()
            .write(&encode_sentence(&[
                "/ip/firewall/address-list/print",
                "?list=cloudflarev4",
            ]))
            .read(&encode_sentence(&["!re", "=.id=*1", "=address=173.245.48.0/20"]))
            .read(&encode_sentence(&["!re", "=.id=*2", "=address=103.21.244.0/22"]))
            .read(&encode_sentence(&["!done"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        let rows = conn
            .run(&["/ip/firewall/address-list/print", "?list=cloudflarev4"])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(".id").map(String::as_str), Some("*2"));
    }

    #[tokio::test]
    async fn test_empty_reply_yields_no_rows() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/ip/dns/static/print"]))
            .read(&encode_sentence(&["!empty"]))
            .read(&encode_sentence(&["!done"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        assert!(conn.run(&["/ip/dns/static/print"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trap_is_store_error_and_session_survives() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/ip/firewall/address-list/remove", "=.id=*99"]))
            .read(&encode_sentence(&["!trap", "=message=no such item"]))
            .read(&encode_sentence(&["!done"]))
            .write(&encode_sentence(&["/ip/firewall/address-list/remove", "=.id=*1"]))
            .read(&encode_sentence(&["!done"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        let err = conn
            .run(&["/ip/firewall/address-list/remove", "=.id=*99"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
        assert!(!err.is_transport());

        conn.run(&["/ip/firewall/address-list/remove", "=.id=*1"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fatal_is_transport_error() {
        let mock = Builder::new()
            .write(&encode_sentence(&["/ip/dns/static/print"]))
            .read(&encode_sentence(&["!fatal", "not logged in"]))
            .build();

        let mut conn = ApiConnection::new(mock);
        let err = conn.run(&["/ip/dns/static/print"]).await.unwrap_err();
        assert!(err.is_transport());
    }
}
