// # RouterOS Store
//
// Router store backed by the MikroTik RouterOS API (TCP, default port 8728).
//
// ## Tables
//
// | Data                  | Menu                           |
// |-----------------------|--------------------------------|
// | IPv4 address lists    | `/ip/firewall/address-list`    |
// | IPv6 address lists    | `/ipv6/firewall/address-list`  |
// | Static AAAA records   | `/ip/dns/static` (`type=AAAA`) |
//
// ## Session Handling
//
// - `RouterOsStore::connect` opens and authenticates the session up front so
//   a bad address or bad credentials fail at startup
// - Every call is bounded by the configured timeout
// - A transport error or a timeout drops the session; the next call opens a
//   fresh one. A `!trap` keeps it.
// - One command at a time; the session sits behind an async mutex
//
// ## Security
//
// - The password is sent only inside the `/login` sentence
// - It never appears in logs, errors or `Debug` output

pub mod connection;
pub mod proto;

pub use connection::ApiConnection;

use async_trait::async_trait;
use mtsync_core::config::RouterConfig;
use mtsync_core::traits::{
    AddressFamily, Bucket, DnsEntry, ListEntry, RecordHandle, RouterStore,
};
use mtsync_core::{Error, Result};
use proto::Attributes;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

pub(crate) const STORE_NAME: &str = "routeros";

const DNS_STATIC_MENU: &str = "/ip/dns/static";

fn address_list_menu(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "/ip/firewall/address-list",
        AddressFamily::V6 => "/ipv6/firewall/address-list",
    }
}

fn list_entries_command(bucket: &Bucket) -> Vec<String> {
    vec![
        format!("{}/print", address_list_menu(bucket.family)),
        "=.proplist=.id,list,address".to_string(),
        format!("?list={}", bucket.list),
    ]
}

fn add_entry_command(bucket: &Bucket, address: &str) -> Vec<String> {
    vec![
        format!("{}/add", address_list_menu(bucket.family)),
        format!("=list={}", bucket.list),
        format!("=address={}", address),
    ]
}

fn remove_entry_command(bucket: &Bucket, handle: &RecordHandle) -> Vec<String> {
    vec![
        format!("{}/remove", address_list_menu(bucket.family)),
        format!("=.id={}", handle),
    ]
}

fn list_dns_command() -> Vec<String> {
    vec![
        format!("{}/print", DNS_STATIC_MENU),
        "=.proplist=.id,name,regexp,address,type".to_string(),
        "?type=AAAA".to_string(),
    ]
}

fn add_dns_command(name: &str, address: &str) -> Vec<String> {
    vec![
        format!("{}/add", DNS_STATIC_MENU),
        format!("=name={}", name),
        format!("=address={}", address),
        "=type=AAAA".to_string(),
    ]
}

fn remove_dns_command(handle: &RecordHandle) -> Vec<String> {
    vec![
        format!("{}/remove", DNS_STATIC_MENU),
        format!("=.id={}", handle),
    ]
}

fn required<'a>(row: &'a Attributes, key: &str) -> Result<&'a str> {
    row.get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::store(STORE_NAME, format!("reply row is missing {:?}", key)))
}

fn parse_list_entries(bucket: &Bucket, rows: &[Attributes]) -> Result<Vec<ListEntry>> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        // The router filters by `?list=`; rows without a list are still checked
        let list = row.get("list").map(String::as_str).unwrap_or(&bucket.list);
        if list != bucket.list {
            continue;
        }
        entries.push(ListEntry {
            handle: RecordHandle::new(required(row, ".id")?),
            list: list.to_string(),
            address: required(row, "address")?.to_string(),
        });
    }
    Ok(entries)
}

fn parse_dns_entries(rows: &[Attributes]) -> Result<Vec<DnsEntry>> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        if row.get("type").is_some_and(|kind| kind != "AAAA") {
            continue;
        }
        // `regexp` entries carry no name and can never match a hostname
        let Some(name) = row.get("name") else {
            continue;
        };
        entries.push(DnsEntry {
            handle: RecordHandle::new(required(row, ".id")?),
            name: name.clone(),
            address: row.get("address").cloned().unwrap_or_default(),
        });
    }
    Ok(entries)
}

/// Router store speaking the RouterOS API
pub struct RouterOsStore {
    config: RouterConfig,
    session: Mutex<Option<ApiConnection<TcpStream>>>,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for RouterOsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterOsStore")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("username", &self.config.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl RouterOsStore {
    /// Create a store that connects on first use
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Connect and log in now
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` if the router does not answer in time
    /// - `Error::Io` if the TCP connection fails
    /// - `Error::Authentication` if the credentials are refused
    pub async fn connect(config: RouterConfig) -> Result<Self> {
        let session = open_session(&config).await?;
        Ok(Self {
            config,
            session: Mutex::new(Some(session)),
        })
    }

    /// Whether a session is currently held
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn call(&self, words: Vec<String>) -> Result<Vec<Attributes>> {
        let mut session = self.session.lock().await;

        if session.is_none() {
            tracing::info!(
                "Connecting to router {}:{}",
                self.config.host,
                self.config.port
            );
            *session = Some(open_session(&self.config).await?);
        }

        let conn = session
            .as_mut()
            .ok_or_else(|| Error::store(STORE_NAME, "no session"))?;

        let result = match tokio::time::timeout(self.config.timeout(), conn.run(words.as_slice())).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "{} did not complete within {:?}",
                words.first().map(String::as_str).unwrap_or("command"),
                self.config.timeout()
            ))),
        };

        if let Err(e) = &result {
            if e.is_transport() {
                tracing::warn!("Dropping router session: {}", e);
                *session = None;
            }
        }

        result
    }
}

async fn open_session(config: &RouterConfig) -> Result<ApiConnection<TcpStream>> {
    let timeout = config.timeout();
    let address = (config.host.as_str(), config.port);

    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            Error::timeout(format!(
                "connecting to {}:{} timed out after {:?}",
                config.host, config.port, timeout
            ))
        })??;
    stream.set_nodelay(true)?;

    let mut conn = ApiConnection::new(stream);
    tokio::time::timeout(timeout, conn.login(&config.username, &config.password))
        .await
        .map_err(|_| Error::timeout(format!("login timed out after {:?}", timeout)))??;

    tracing::debug!("Logged in to router as {}", config.username);
    Ok(conn)
}

#[async_trait]
impl RouterStore for RouterOsStore {
    async fn list_entries(&self, bucket: &Bucket) -> Result<Vec<ListEntry>> {
        let rows = self.call(list_entries_command(bucket)).await?;
        parse_list_entries(bucket, &rows)
    }

    async fn add_entry(&self, bucket: &Bucket, address: &str) -> Result<()> {
        self.call(add_entry_command(bucket, address)).await?;
        Ok(())
    }

    async fn remove_entry(&self, bucket: &Bucket, handle: &RecordHandle) -> Result<()> {
        self.call(remove_entry_command(bucket, handle)).await?;
        Ok(())
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsEntry>> {
        let rows = self.call(list_dns_command()).await?;
        parse_dns_entries(&rows)
    }

    async fn add_dns_record(&self, name: &str, address: &str) -> Result<()> {
        self.call(add_dns_command(name, address)).await?;
        Ok(())
    }

    async fn remove_dns_record(&self, handle: &RecordHandle) -> Result<()> {
        self.call(remove_dns_command(handle)).await?;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        STORE_NAME
    }
}
