use crate::barefoot::{BarefootApi, SoapClient};
use crate::config::Config;
use crate::db::connection::{init_db, Database};
use crate::responses::error_to_response;
use crate::router::{handle, AppState};
use astra::Server;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod barefoot;
mod config;
mod db;
mod domain;
mod errors;
mod responses;
mod router;
mod sync;
mod xml;

#[cfg(test)]
mod tests;

/// Mirror a Barefoot vacation-rental account into a local SQLite catalogue.
#[derive(Parser, Debug)]
#[clap(name = "barefoot-sync", version)]
struct Args {
    /// SQLite file; overrides DATABASE_PATH
    #[clap(long, value_name = "FILE")]
    database: Option<String>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP trigger endpoints (default)
    Serve {
        /// Listen address; overrides BIND_ADDR
        #[clap(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Run one full sync and print the report
    Sync,
    /// Retire properties the service no longer returns
    Cleanup,
    /// Call GetUrlTest and print the result
    TestConnection {
        /// Also print the raw SOAP request and response bodies
        #[clap(long)]
        show_raw: bool,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => error!(error = %e, "could not render report"),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barefoot_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = args.database {
        config.database_path = path;
    }

    let db = Database::new(config.database_path.clone());
    if let Err(e) = init_db(&db) {
        error!(error = %e, "database initialization failed");
        return ExitCode::FAILURE;
    }

    let state = AppState::new(db, config);

    let ok = match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(state, bind),
        Command::Sync => report(router::run_sync(&state), |r| r.success),
        Command::Cleanup => report(router::run_cleanup(&state), |r| r.success),
        Command::TestConnection { show_raw: false } => {
            report(router::test_connection(&state), |r| r.success)
        }
        Command::TestConnection { show_raw: true } => test_connection_raw(&state.config),
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report<T: Serialize>(
    result: Result<T, errors::ServerError>,
    succeeded: impl Fn(&T) -> bool,
) -> bool {
    match result {
        Ok(report) => {
            print_json(&report);
            succeeded(&report)
        }
        Err(e) => {
            error!(error = %e, "operation failed");
            false
        }
    }
}

/// Connection test on a concrete client so the raw exchange can be shown.
fn test_connection_raw(config: &Config) -> bool {
    let client = match SoapClient::new(&config.credentials, config.timeout) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "could not build SOAP client");
            return false;
        }
    };
    let plan = config.plan();
    let result = BarefootApi::new(&client, &config.credentials, &plan).test_connection();
    print_json(&result);

    println!("--- request ---");
    println!("{}", client.last_request().unwrap_or_default());
    println!("--- response ---");
    println!("{}", client.last_response().unwrap_or_default());
    result.success
}

fn serve(state: AppState, bind: Option<std::net::SocketAddr>) -> bool {
    let addr = bind.unwrap_or(state.config.bind_addr);
    info!(%addr, "starting server");

    let server = Server::bind(&addr).max_workers(8);

    let result = server.serve(move |req, _info| match handle(req, &state) {
        Ok(resp) => resp,
        Err(err) => error_to_response(err),
    });

    match result {
        Ok(()) => {
            info!("server shut down cleanly");
            true
        }
        Err(e) => {
            error!(error = %e, "server ended with error");
            false
        }
    }
}
