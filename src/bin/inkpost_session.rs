//!
//! inkpost session CLI
//! -------------------
//! Command-line front end for the session store: logs in against a running
//! inkpost server, keeps the credential in a profile directory, and
//! reconciles it with the server on every invocation the way an app shell
//! would at startup.

use std::env;
use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use inkpost::identity::{FileCredentialStore, HttpApiClient, SessionStore};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} login <email> [--server <url>]   log in; password read from INKPOST_PASSWORD or stdin\n  {program} whoami [--server <url>]          show the account the stored credential resolves to\n  {program} refresh [--server <url>]         re-fetch the current identity\n  {program} logout [--server <url>]          notify the server and clear the stored session\n  {program} status [--server <url>]          print local session state after reconciliation\n\nDefaults:\n  --server defaults to INKPOST_URL or http://127.0.0.1:7878.\n  The session file lives under INKPOST_PROFILE_DIR or ./.inkpost."
    );
}

fn parse_server_arg(args: &[String]) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--server" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn read_password() -> Result<String> {
    if let Ok(pw) = env::var("INKPOST_PASSWORD") {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    eprint!("password: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let pw = line.trim_end_matches(['\r', '\n']).to_string();
    if pw.is_empty() {
        return Err(anyhow!("empty password"));
    }
    Ok(pw)
}

fn print_status(session: &SessionStore) {
    let snap = session.snapshot();
    match (&snap.account, session.is_authenticated()) {
        (Some(account), true) => {
            println!("logged in as {} ({}), status {}", account.email, account.role, account.status);
        }
        _ => println!("not logged in"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(|s| s.as_str()).unwrap_or("inkpost_session").to_string();
    let Some(command) = args.get(1).cloned() else {
        print_usage(&program);
        return Err(anyhow!("missing command"));
    };

    let server = parse_server_arg(&args)
        .or_else(|| env::var("INKPOST_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:7878".to_string());
    let profile_dir = env::var("INKPOST_PROFILE_DIR").unwrap_or_else(|_| ".inkpost".to_string());

    let api = Arc::new(HttpApiClient::new(&server)?);
    let storage = Arc::new(FileCredentialStore::open(std::path::Path::new(&profile_dir))?);
    let session = SessionStore::new(api, storage);

    match command.as_str() {
        "login" => {
            let Some(email) = args.get(2).filter(|a| !a.starts_with("--")).cloned() else {
                print_usage(&program);
                return Err(anyhow!("login requires an email"));
            };
            session.initialize().await;
            let password = read_password()?;
            let account = session.login(&email, &password).await?;
            println!("logged in as {} ({})", account.email, account.role);
        }
        "whoami" | "status" => {
            session.initialize().await;
            print_status(&session);
        }
        "refresh" => {
            session.initialize().await;
            session.refresh().await;
            print_status(&session);
        }
        "logout" => {
            session.initialize().await;
            session.logout().await;
            println!("logged out");
        }
        other => {
            print_usage(&program);
            return Err(anyhow!("unknown command: {other}"));
        }
    }
    Ok(())
}
