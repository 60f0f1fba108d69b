use std::{net::SocketAddr, path::Path, time::Duration};

use config::Config;
use server::ServeConfig;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Send a POST request with a raw body and a JSON content type
    pub async fn post_raw(&self, path: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// Check access and return the response status with its JSON body
    pub async fn access(&self, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = self.post(server::ACCESS_PATH, &body).await;
        let status = response.status().as_u16();

        (status, response.json().await.unwrap())
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Start a server keeping buckets in memory only
    pub async fn start(config_toml: &str) -> Self {
        let mut config = parse(config_toml);
        config.persistence.enabled = false;

        Self::spawn(config).await
    }

    /// Start a server restoring from and saving to `directory`
    pub async fn start_with_snapshots(config_toml: &str, directory: &Path) -> Self {
        let mut config = parse(config_toml);
        config.persistence.enabled = true;
        config.persistence.directory = directory.to_path_buf();

        Self::spawn(config).await
    }

    async fn spawn(config: Config) -> Self {
        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown: shutdown.clone(),
        };

        let handle = tokio::spawn(server::serve(serve_config));

        let mut retries = 50;

        while TcpStream::connect(address).await.is_err() {
            assert!(!handle.is_finished(), "server exited during startup");
            assert!(retries > 0, "server did not start listening on {address}");

            retries -= 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestServer {
            client: TestClient::new(format!("http://{address}")),
            address,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the server, waiting for its final snapshot save
    pub async fn stop(mut self) {
        self.shutdown.cancel();

        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn parse(config_toml: &str) -> Config {
    let config: Config = toml::from_str(config_toml).unwrap();
    config.validate().unwrap();

    config
}
