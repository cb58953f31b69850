#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::print_stdout,
    clippy::allow_attributes
)]
use std::{net::SocketAddr, process::Stdio};

use reqwest::Response;
use tempfile::NamedTempFile;
use tokio::{
    io::AsyncBufReadExt,
    process::{Child, Command},
    sync::mpsc::UnboundedReceiver,
};

pub fn gateway_path() -> String {
    // Compatibility with 'cargo nextest archive': https://nexte.st/docs/ci-features/archiving/#making-tests-relocatable
    std::env::var("NEXTEST_BIN_EXE_gateway")
        .unwrap_or_else(|_| env!("CARGO_BIN_EXE_gateway").to_string())
}

fn write_config(config_str: &str) -> NamedTempFile {
    let tmpfile = NamedTempFile::new().unwrap();
    std::fs::write(tmpfile.path(), config_str).unwrap();
    tmpfile
}

fn gateway_command(config_file: &NamedTempFile, extra_args: &[&str]) -> Command {
    let mut builder = Command::new(gateway_path());
    builder
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .args([
            "--config-file",
            config_file.path().to_str().unwrap(),
            "--log-format",
            "json",
        ])
        .args(extra_args)
        // Make sure we don't inherit `RUST_LOG` from the outer `cargo test/nextest` invocation
        .env_remove("RUST_LOG")
        .kill_on_drop(true);
    builder
}

/// Start the gateway with `[gateway].bind_address` set to port 0 plus `config_suffix`
/// (which goes inside the `[gateway]` table unless it opens a new one).
#[allow(dead_code)]
pub async fn start_gateway_on_random_port(config_suffix: &str) -> ChildData {
    let config_file = write_config(&format!(
        r#"
        [gateway]
        bind_address = "0.0.0.0:0"
        {config_suffix}
    "#
    ));
    spawn_and_wait_for_startup(gateway_command(&config_file, &[]), "0.0.0.0").await
}

#[allow(dead_code)]
pub async fn start_gateway_with_cli_bind_address(
    config_bind_address: Option<&str>,
    cli_bind_address: &str,
    config_suffix: &str,
) -> ChildData {
    let config_file = write_config(&config_with_bind_address(config_bind_address, config_suffix));
    let ip = cli_bind_address
        .rsplit_once(':')
        .map(|(ip, _)| ip)
        .unwrap_or(cli_bind_address);
    spawn_and_wait_for_startup(
        gateway_command(&config_file, &["--bind-address", cli_bind_address]),
        ip,
    )
    .await
}

/// Start a gateway that is expected to exit during startup, returning its stdout lines
#[allow(dead_code)]
pub async fn start_gateway_expect_failure(
    config_bind_address: Option<&str>,
    cli_bind_address: &str,
    config_suffix: &str,
) -> Vec<String> {
    let config_file = write_config(&config_with_bind_address(config_bind_address, config_suffix));
    let mut child = gateway_command(&config_file, &["--bind-address", cli_bind_address])
        .spawn()
        .unwrap();
    let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap()).lines();
    let mut output = Vec::new();
    while let Some(line) = stdout.next_line().await.unwrap() {
        println!("{line}");
        output.push(line);
    }
    let status = child.wait().await.unwrap();
    assert!(!status.success(), "Gateway should have failed to start");
    output
}

/// Spawn the gateway with `config_str` and collect its stdout until a line contains one of
/// `markers` (or the process exits). The child is returned so it stays alive until dropped.
#[allow(dead_code)]
pub async fn start_gateway_until_log(
    config_str: &str,
    extra_args: &[&str],
    markers: &[&str],
) -> (Child, Vec<String>) {
    let config_file = write_config(config_str);
    let mut child = gateway_command(&config_file, extra_args).spawn().unwrap();
    let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap()).lines();
    let mut output = Vec::new();
    while let Some(line) = stdout.next_line().await.unwrap() {
        println!("{line}");
        let done = markers.iter().any(|marker| line.contains(marker));
        output.push(line);
        if done {
            break;
        }
    }
    (child, output)
}

fn config_with_bind_address(config_bind_address: Option<&str>, config_suffix: &str) -> String {
    let bind_address_line = config_bind_address
        .map(|addr| format!("bind_address = \"{addr}\""))
        .unwrap_or_default();
    format!(
        r"
        [gateway]
        {bind_address_line}
        {config_suffix}
    "
    )
}

async fn spawn_and_wait_for_startup(mut builder: Command, ip: &str) -> ChildData {
    let mut child = builder.spawn().unwrap();
    let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap()).lines();

    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(line) = stdout.next_line().await.unwrap() {
            println!("{line}");
            let _ = line_tx.send(line);
        }
    });

    let listening_marker = format!("listening on {ip}:");
    let mut listening_line = None;
    let mut output = Vec::new();
    while let Some(line) = line_rx.recv().await {
        if line.contains(&listening_marker) {
            listening_line = Some(line.clone());
        }
        output.push(line.clone());
        if line.contains("{\"message\":\"└") {
            // We're done logging the startup message
            break;
        }
    }

    let port = listening_line
        .expect("Gateway exited before listening")
        .split_once(&listening_marker)
        .expect("Gateway didn't log listening line")
        .1
        .split('"')
        .next()
        .unwrap()
        .parse::<u16>()
        .unwrap();

    ChildData {
        addr: format!("{ip}:{port}").parse::<SocketAddr>().unwrap(),
        output,
        stdout: line_rx,
        child,
    }
}

#[expect(dead_code)] // Not all tests use all fields
pub struct ChildData {
    pub addr: SocketAddr,
    pub output: Vec<String>,
    pub stdout: UnboundedReceiver<String>,
    // This kills the child on drop
    pub child: Child,
}

impl ChildData {
    #[allow(dead_code)]
    pub async fn call_health_endpoint(&self) -> Response {
        reqwest::Client::new()
            .get(format!("http://{}/health", self.addr))
            .send()
            .await
            .unwrap()
    }

    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}
