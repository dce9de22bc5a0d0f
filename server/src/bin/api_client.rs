use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use bootstrap::ServicesConfig;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use server::config::ApiSettings;
use server::middleware::authorization_value;

#[derive(Debug, Clone)]
struct ClientConfig {
    base: Option<String>,
    services_config: Option<PathBuf>,
    service: String,
    ca_certs: Vec<PathBuf>,
    username: String,
    password: String,
    timeout_ms: u64,
    keep_account: bool,
}

#[derive(Debug, Deserialize)]
struct AccountCreated {
    #[serde(rename = "accountID")]
    account_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "issuedAt")]
    issued_at: String,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<SessionInfo>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cfg = parse_args()?;
    let base = resolve_endpoint(&mut cfg)?;

    println!("[api-client] target: {}", base);

    let mut builder = reqwest::Client::builder().timeout(Duration::from_millis(cfg.timeout_ms));
    for path in &cfg.ca_certs {
        let pem = std::fs::read(path)
            .with_context(|| format!("cannot read CA bundle '{}'", path.display()))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("invalid CA bundle '{}'", path.display()))?;
        builder = builder.add_root_certificate(cert);
    }
    let client = builder.build().context("failed to build HTTP client")?;

    run_flow(&client, &base, &cfg).await?;

    println!("[api-client] flow completed");
    Ok(())
}

async fn run_flow(client: &reqwest::Client, base: &str, cfg: &ClientConfig) -> anyhow::Result<()> {
    let form = [("uname", cfg.username.as_str()), ("pass", cfg.password.as_str())];

    let response = client
        .post(format!("{}/accounts", base))
        .form(&form)
        .send()
        .await
        .context("network error on POST /accounts")?;
    match response.status() {
        StatusCode::CREATED => {
            let created: AccountCreated = response.json().await?;
            println!("[api-client] account created: {}", created.account_id);
        }
        StatusCode::CONFLICT => println!("[api-client] account already exists, reusing it"),
        status => bail!("POST /accounts failed with {}: {}", status, body_of(response).await),
    }

    let response = client
        .post(format!("{}/sessions", base))
        .form(&form)
        .send()
        .await
        .context("network error on POST /sessions")?;
    if response.status() != StatusCode::CREATED {
        let status = response.status();
        bail!("POST /sessions failed with {}: {}", status, body_of(response).await);
    }
    let session: SessionCreated = response.json().await?;
    let authorization = authorization_value(&session.session_id);
    println!("[api-client] login OK: session {}", session.session_id);

    let response = client
        .get(format!("{}/sessions", base))
        .header(reqwest::header::AUTHORIZATION, &authorization)
        .send()
        .await
        .context("network error on GET /sessions")?;
    if response.status() != StatusCode::OK {
        let status = response.status();
        bail!("GET /sessions failed with {}: {}", status, body_of(response).await);
    }
    let listed: SessionList = response.json().await?;
    println!("[api-client] {} live session(s)", listed.sessions.len());
    for s in &listed.sessions {
        println!("[api-client] - {} issued at {}", s.session_id, s.issued_at);
    }

    let session_url = format!("{}/sessions/{}", base, session.session_id);
    expect_status(client, Method::HEAD, &session_url, &authorization, StatusCode::OK).await?;
    expect_status(
        client,
        Method::DELETE,
        &session_url,
        &authorization,
        StatusCode::NO_CONTENT,
    )
    .await?;
    expect_status(
        client,
        Method::GET,
        &session_url,
        &authorization,
        StatusCode::UNAUTHORIZED,
    )
    .await?;
    println!("[api-client] session revoked");

    if !cfg.keep_account {
        let response = client
            .delete(format!("{}/accounts", base))
            .form(&form)
            .send()
            .await
            .context("network error on DELETE /accounts")?;
        if response.status() != StatusCode::NO_CONTENT {
            let status = response.status();
            bail!("DELETE /accounts failed with {}: {}", status, body_of(response).await);
        }
        println!("[api-client] account deleted");
    }

    Ok(())
}

async fn expect_status(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    authorization: &str,
    expected: StatusCode,
) -> anyhow::Result<()> {
    let response = client
        .request(method.clone(), url)
        .header(reqwest::header::AUTHORIZATION, authorization)
        .send()
        .await
        .with_context(|| format!("network error on {} {}", method, url))?;

    if response.status() != expected {
        let status = response.status();
        bail!(
            "{} {} answered {} (expected {}): {}",
            method,
            url,
            status,
            expected,
            body_of(response).await
        );
    }
    println!("[api-client] {} {} -> {}", method, url, expected);
    Ok(())
}

async fn body_of(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string())
}

/// Base URL from `--base`, or from the API service in the bootstrap file,
/// whose `tls.certifyingAuthorities` are trusted as well.
fn resolve_endpoint(cfg: &mut ClientConfig) -> anyhow::Result<String> {
    if let Some(base) = &cfg.base {
        return Ok(base.trim_end_matches('/').to_string());
    }

    let path = cfg
        .services_config
        .clone()
        .unwrap_or_else(server::config::services_config_path);
    let services = ServicesConfig::load_from_file(&path)?;
    let descriptor = services
        .service(&cfg.service)
        .ok_or_else(|| anyhow!("no service named '{}' in {}", cfg.service, path.display()))?;
    let settings: ApiSettings = descriptor.settings()?;

    let scheme = match &settings.tls {
        Some(tls) => {
            cfg.ca_certs.extend(tls.certifying_authorities.iter().cloned());
            "https"
        }
        None => "http",
    };
    Ok(format!("{}://{}:{}", scheme, settings.host, settings.port))
}

fn parse_args() -> anyhow::Result<ClientConfig> {
    let mut cfg = ClientConfig {
        base: None,
        services_config: None,
        service: "api".to_string(),
        ca_certs: Vec::new(),
        username: String::new(),
        password: String::new(),
        timeout_ms: 5_000,
        keep_account: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--base" => cfg.base = Some(next_arg_value(&mut args, &arg)?),
            "--services-config" => {
                cfg.services_config = Some(PathBuf::from(next_arg_value(&mut args, &arg)?))
            }
            "--service" => cfg.service = next_arg_value(&mut args, &arg)?,
            "--ca-cert" => cfg.ca_certs.push(PathBuf::from(next_arg_value(&mut args, &arg)?)),
            "--username" => cfg.username = next_arg_value(&mut args, &arg)?,
            "--password" => cfg.password = next_arg_value(&mut args, &arg)?,
            "--timeout-ms" => {
                let value = next_arg_value(&mut args, &arg)?;
                cfg.timeout_ms = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid --timeout-ms: {}", value))?;
            }
            "--keep-account" => cfg.keep_account = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}\nUse --help to list the options.", other),
        }
    }

    if cfg.username.is_empty() || cfg.password.is_empty() {
        bail!("--username and --password are required");
    }

    Ok(cfg)
}

fn next_arg_value<I>(args: &mut I, flag: &str) -> anyhow::Result<String>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or_else(|| anyhow!("missing value for {}", flag))
}

fn print_help() {
    println!(
        "api-client - drives the account/session flow against a running API\n\n\
Usage:\n\
  cargo run -p server --bin api-client -- [options]\n\n\
Options:\n\
  --username <user>            Account username (required)\n\
  --password <pass>            Account password (required)\n\
  --base <url>                 API base URL; overrides the bootstrap file\n\
  --services-config <path>     Bootstrap file (default: $SERVICES_CONFIG or server/config/services.toml)\n\
  --service <name>             API service in the bootstrap file (default: api)\n\
  --ca-cert <pem>              Extra CA bundle to trust (repeatable)\n\
  --keep-account               Do not delete the account at the end\n\
  --timeout-ms <ms>            HTTP timeout (default: 5000)\n\
  --help                       Show this help\n"
    );
}
