pub mod model;

use crate::config::schema::ProfileKind;
use crate::config::store::Settings;
use crate::error::{DeckError, Result};
use async_trait::async_trait;
use model::{
    decode_collection, Alarm, Collection, Population, ServerListing, ServerTime, Switch, SwitchGroup,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// A command the backend accepts for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Toggle { switch_id: String },
    GroupOn { group_id: String },
    GroupOff { group_id: String },
}

impl DeviceCommand {
    /// Path under the base URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Toggle { switch_id } => format!("switches/{switch_id}/toggle"),
            Self::GroupOn { group_id } => format!("switchgroups/{group_id}/on"),
            Self::GroupOff { group_id } => format!("switchgroups/{group_id}/off"),
        }
    }
}

/// Remote source of device collections and sink for device commands.
///
/// Implementations keep no state between calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn switches(&self, base_url: Option<&str>) -> Result<Vec<Switch>>;

    async fn alarms(&self, base_url: Option<&str>) -> Result<Vec<Alarm>>;

    async fn switch_groups(&self, base_url: Option<&str>) -> Result<Vec<SwitchGroup>>;

    /// Issue a command. Resolves once the backend has acknowledged it.
    async fn send(&self, base_url: Option<&str>, command: &DeviceCommand) -> Result<()>;

    /// Player counts; `path` is relative to the base URL.
    async fn population(&self, base_url: Option<&str>, path: &str) -> Result<Population>;

    async fn server_time(&self, base_url: Option<&str>) -> Result<ServerTime>;

    /// The paired server, read from the base URL itself. A service with no
    /// active server yields an empty listing.
    async fn active_server(&self, base_url: Option<&str>) -> Result<ServerListing>;
}

/// Result of one refresh cycle, per collection.
///
/// `None` means the collection was not requested for the active profile.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub switches: Option<Result<Vec<Switch>>>,
    pub alarms: Option<Result<Vec<Alarm>>>,
    pub groups: Option<Result<Vec<SwitchGroup>>>,
}

/// Fetch everything the profile in `settings` needs.
///
/// Group profiles also fetch switches so that group state can be derived
/// from member switches. Multiple collections are fetched concurrently.
pub async fn fetch_for(gateway: &dyn Gateway, settings: &Settings) -> FetchOutcome {
    let base = settings.base_url.as_deref();

    match settings.profile_kind {
        ProfileKind::Switches => FetchOutcome {
            switches: Some(gateway.switches(base).await),
            ..FetchOutcome::default()
        },
        ProfileKind::Alarms => FetchOutcome {
            alarms: Some(gateway.alarms(base).await),
            ..FetchOutcome::default()
        },
        ProfileKind::SwitchGroups => {
            let (groups, switches) =
                futures::join!(gateway.switch_groups(base), gateway.switches(base));
            FetchOutcome {
                switches: Some(switches),
                groups: Some(groups),
                ..FetchOutcome::default()
            }
        }
        ProfileKind::Devices => {
            let (switches, alarms, groups) = futures::join!(
                gateway.switches(base),
                gateway.alarms(base),
                gateway.switch_groups(base)
            );
            FetchOutcome {
                switches: Some(switches),
                alarms: Some(alarms),
                groups: Some(groups),
            }
        }
    }
}

/// Error text the service answers with when it is not paired.
const NO_ACTIVE_SERVER: &str = "Guild not found or no active server";

/// The configured base URL without trailing slashes.
///
/// # Errors
/// Returns `DeckError::Config` if no base URL is configured.
pub fn base(base_url: Option<&str>) -> Result<&str> {
    base_url
        .map(|b| b.trim().trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| DeckError::Config("base URL not configured".to_string()))
}

/// Join a configured base URL and a relative path.
///
/// # Errors
/// Returns `DeckError::Config` if no base URL is configured.
pub fn endpoint(base_url: Option<&str>, path: &str) -> Result<String> {
    let path = path.trim_start_matches('/');
    Ok(format!("{}/{path}", base(base_url)?))
}

/// [`Gateway`] backed by the companion service's REST API.
pub struct HttpGateway {
    client: reqwest::Client,
}

impl HttpGateway {
    /// # Errors
    /// Returns `DeckError::Transport` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GET `url`, returning the status and the whole body.
    async fn get(&self, url: &str) -> Result<(reqwest::StatusCode, Vec<u8>)> {
        debug!("GET {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeckError::Transport(format!("GET {url}: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| DeckError::Transport(format!("GET {url}: {e}")))?;
        Ok((status, body.to_vec()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let (status, body) = self.get(url).await?;
        if !status.is_success() {
            return Err(DeckError::Transport(format!("GET {url} → {status}")));
        }
        serde_json::from_slice(&body).map_err(|e| DeckError::Decode(format!("GET {url}: {e}")))
    }

    async fn get_collection<T: Collection>(&self, base_url: Option<&str>) -> Result<Vec<T>> {
        let url = endpoint(base_url, T::RESOURCE)?;
        let value: serde_json::Value = self.get_json(&url).await?;

        let items = decode_collection::<T>(value)?;
        debug!("fetched {} {}", items.len(), T::RESOURCE);
        Ok(items)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn switches(&self, base_url: Option<&str>) -> Result<Vec<Switch>> {
        self.get_collection(base_url).await
    }

    async fn alarms(&self, base_url: Option<&str>) -> Result<Vec<Alarm>> {
        self.get_collection(base_url).await
    }

    async fn switch_groups(&self, base_url: Option<&str>) -> Result<Vec<SwitchGroup>> {
        self.get_collection(base_url).await
    }

    async fn send(&self, base_url: Option<&str>, command: &DeviceCommand) -> Result<()> {
        let url = endpoint(base_url, &command.path())?;
        debug!("POST {url}");

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| DeckError::Command(format!("POST {url}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            debug!("POST {url} → {status}");
            Ok(())
        } else {
            warn!("POST {url} → {status}");
            Err(DeckError::Command(format!("POST {url} → {status}")))
        }
    }

    async fn population(&self, base_url: Option<&str>, path: &str) -> Result<Population> {
        let url = endpoint(base_url, path)?;
        self.get_json(&url).await
    }

    async fn server_time(&self, base_url: Option<&str>) -> Result<ServerTime> {
        let url = endpoint(base_url, "time")?;
        self.get_json(&url).await
    }

    async fn active_server(&self, base_url: Option<&str>) -> Result<ServerListing> {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let url = base(base_url)?;
        let (status, body) = self.get(url).await?;
        if !status.is_success() {
            let unpaired = serde_json::from_slice::<ErrorBody>(&body)
                .is_ok_and(|b| b.error == NO_ACTIVE_SERVER);
            if unpaired {
                debug!("GET {url}: no active server");
                return Ok(ServerListing::default());
            }
            return Err(DeckError::Transport(format!("GET {url} → {status}")));
        }
        serde_json::from_slice(&body).map_err(|e| DeckError::Decode(format!("GET {url}: {e}")))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/")
    }

    fn gateway() -> HttpGateway {
        HttpGateway::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn endpoint_strips_trailing_slashes() {
        assert_eq!(
            endpoint(Some("http://host:8080//"), "switches").unwrap(),
            "http://host:8080/switches"
        );
        assert_eq!(
            endpoint(Some("http://host:8080"), "/pop").unwrap(),
            "http://host:8080/pop"
        );
        assert!(matches!(endpoint(None, "alarms"), Err(DeckError::Config(_))));
        assert!(matches!(endpoint(Some(" "), "alarms"), Err(DeckError::Config(_))));
    }

    #[test]
    fn command_paths() {
        let toggle = DeviceCommand::Toggle { switch_id: "7".into() };
        let off = DeviceCommand::GroupOff { group_id: "g".into() };
        assert_eq!(toggle.path(), "switches/7/toggle");
        assert_eq!(off.path(), "switchgroups/g/off");
    }

    #[tokio::test]
    async fn fetch_switches_over_http() {
        let base = serve_once(
            "200 OK",
            r#"{"total":1,"connected":true,"switches":[{"id":"1","name":"Door","active":true,"reachable":true}]}"#,
        )
        .await;
        let switches = gateway().switches(Some(&base)).await.unwrap();
        assert_eq!(switches.len(), 1);
        assert_eq!(switches[0].name, "Door");
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let base = serve_once("500 Internal Server Error", "").await;
        let err = gateway().switches(Some(&base)).await.unwrap_err();
        assert!(matches!(err, DeckError::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn garbage_body_is_decode_error() {
        let base = serve_once("200 OK", "<html>not json</html>").await;
        let err = gateway().alarms(Some(&base)).await.unwrap_err();
        assert!(matches!(err, DeckError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_base_url_never_hits_network() {
        let err = gateway().switch_groups(None).await.unwrap_err();
        assert!(matches!(err, DeckError::Config(_)));
    }

    #[tokio::test]
    async fn rejected_command_is_command_error() {
        let base = serve_once("404 Not Found", "").await;
        let cmd = DeviceCommand::Toggle { switch_id: "1".into() };
        let err = gateway().send(Some(&base), &cmd).await.unwrap_err();
        assert!(matches!(err, DeckError::Command(_)));
    }

    #[tokio::test]
    async fn population_path_is_relative_to_base() {
        let base = serve_once(
            "200 OK",
            r#"{"currentPlayers":87,"maxPlayers":200,"queuedPlayers":3}"#,
        )
        .await;
        let pop = gateway().population(Some(&base), "/pop").await.unwrap();
        assert_eq!((pop.current_players, pop.max_players, pop.queued_players), (87, 200, 3));
    }

    #[tokio::test]
    async fn unpaired_service_is_an_empty_listing() {
        let base = serve_once(
            "404 Not Found",
            r#"{"error":"Guild not found or no active server"}"#,
        )
        .await;
        let listing = gateway().active_server(Some(&base)).await.unwrap();
        assert_eq!(listing, model::ServerListing::default());
    }

    #[tokio::test]
    async fn other_listing_errors_are_transport_errors() {
        let base = serve_once("502 Bad Gateway", r#"{"error":"upstream"}"#).await;
        let err = gateway().active_server(Some(&base)).await.unwrap_err();
        assert!(matches!(err, DeckError::Transport(_)));
    }

    #[tokio::test]
    async fn group_profile_also_fetches_switches() {
        let gw = fake::FakeGateway::with_switches(vec![fake::switch("1", "Door", true)]);
        gw.state.lock().unwrap().groups = vec![fake::group("g", "Base", &["1"])];
        let settings = Settings {
            base_url: Some("http://fake".into()),
            profile_kind: ProfileKind::SwitchGroups,
            ..Settings::default()
        };

        let outcome = fetch_for(&gw, &settings).await;
        assert_eq!(outcome.groups.unwrap().unwrap().len(), 1);
        assert_eq!(outcome.switches.unwrap().unwrap().len(), 1);
        assert!(outcome.alarms.is_none());
    }
}
