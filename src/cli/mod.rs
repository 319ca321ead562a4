//! Command-line interface for healyri-dispatch.
//!
//! Provides commands for dispatching requests, sweeping pending requests,
//! and inspecting the resulting state and audit events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::core::{AbortReason, DispatchOutcome, Dispatcher};
use crate::domain::{collections, DispatchEvent, EmergencyRequest, GeoPoint};
use crate::store::{Document, DocumentStore, FileStore, Filter, Query, WriteOp, WriteResult};

/// healyri-dispatch - Emergency dispatch engine
#[derive(Parser, Debug)]
#[command(name = "healyri-dispatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a single emergency request
    Dispatch {
        /// Emergency request ID
        emergency_id: String,
    },

    /// Create a new emergency request and dispatch it
    Request {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Request ID (generated if not provided)
        #[arg(long)]
        id: Option<String>,
    },

    /// Retry every request still in `created` status
    Sweep,

    /// Sweep periodically until interrupted
    Watch {
        /// Seconds between sweeps
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// Show the state of an emergency request
    Status {
        /// Emergency request ID
        emergency_id: String,
    },

    /// List audit events for an emergency request
    Events {
        /// Emergency request ID
        emergency_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Dispatch { emergency_id } => dispatch(&emergency_id).await,
            Commands::Request { lat, lng, id } => request(lat, lng, id).await,
            Commands::Sweep => sweep().await,
            Commands::Watch { interval } => watch(interval).await,
            Commands::Status { emergency_id } => show_status(&emergency_id).await,
            Commands::Events { emergency_id } => list_events(&emergency_id).await,
            Commands::Config => show_config(),
        }
    }
}

fn open_store() -> Result<Arc<FileStore>> {
    Ok(Arc::new(FileStore::open(config::store_path()?)))
}

fn dispatcher() -> Result<Dispatcher> {
    let settings = config::config()?.dispatch.clone();
    let store: Arc<dyn DocumentStore> = open_store()?;
    Ok(Dispatcher::new(store, settings))
}

/// Dispatch one request by ID
async fn dispatch(emergency_id: &str) -> Result<()> {
    let outcome = dispatcher()?.dispatch(emergency_id).await?;
    print_outcome(emergency_id, &outcome);
    Ok(())
}

/// Create a request, then run the creation handler on it
async fn request(lat: f64, lng: f64, id: Option<String>) -> Result<()> {
    let dispatcher = dispatcher()?;
    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let request = EmergencyRequest::new(id.clone(), Some(GeoPoint::new(lat, lng)));
    let data = serde_json::to_value(&request).context("Failed to serialize request")?;

    let result = dispatcher
        .store()
        .atomic_write(vec![WriteOp::Create {
            collection: collections::EMERGENCIES.to_string(),
            id: id.clone(),
            data: data.clone(),
        }])
        .await
        .context("Failed to create emergency request")?;

    if let WriteResult::PreconditionFailed { .. } = result {
        anyhow::bail!("Emergency {} already exists", id);
    }
    println!("Created emergency {}", id);

    let outcome = dispatcher.handle_created(&Document::new(id.clone(), data)).await?;
    print_outcome(&id, &outcome);
    Ok(())
}

async fn sweep() -> Result<()> {
    let report = dispatcher()?.sweep().await?;
    println!(
        "Sweep finished: {} dispatched, {} skipped, {} failed",
        report.dispatched, report.skipped, report.failed
    );
    Ok(())
}

async fn watch(interval_secs: u64) -> Result<()> {
    let dispatcher = dispatcher()?;
    let interval = Duration::from_secs(interval_secs.max(1));

    eprintln!("Sweeping every {}s (ctrl-c to stop)", interval.as_secs());

    loop {
        match dispatcher.sweep().await {
            Ok(report) if report.dispatched + report.failed > 0 => {
                println!(
                    "{}: {} dispatched, {} skipped, {} failed",
                    chrono::Utc::now().to_rfc3339(),
                    report.dispatched,
                    report.skipped,
                    report.failed
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Sweep failed"),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn show_status(emergency_id: &str) -> Result<()> {
    let store = open_store()?;
    let document = store
        .get(collections::EMERGENCIES, emergency_id)
        .await?
        .with_context(|| format!("Emergency {} not found", emergency_id))?;

    let request: EmergencyRequest = document
        .parse()
        .with_context(|| format!("Emergency {} is malformed", emergency_id))?;

    println!("Emergency: {}", request.id);
    println!("Status: {}", request.status);
    match request.location {
        Some(p) => println!("Location: ({}, {})", p.latitude, p.longitude),
        None => println!("Location: -"),
    }
    println!(
        "Facility: {}",
        request.assigned_facility_id.as_deref().unwrap_or("-")
    );
    println!(
        "Driver: {}",
        request.assigned_driver_id.as_deref().unwrap_or("-")
    );
    if let Some(at) = request.dispatched_at {
        println!("Dispatched: {}", at);
    }

    Ok(())
}

async fn list_events(emergency_id: &str) -> Result<()> {
    let store = open_store()?;
    let docs = store
        .query(&Query::collection(collections::EVENTS).filter(Filter::eq("emergencyId", json!(emergency_id))))
        .await?;

    let mut events: Vec<DispatchEvent> = docs
        .iter()
        .filter_map(|doc| doc.parse().ok())
        .collect();
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if events.is_empty() {
        println!("No events for emergency {}", emergency_id);
        return Ok(());
    }

    for event in events {
        println!(
            "{}  {:?}  {}  {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_id,
            event.description
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home: {}", config.home.display());
    println!("Store: {}", config.store_path.display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!("Driver radius: {} km", config.dispatch.driver_radius_km);
    println!("Driver candidates: {}", config.dispatch.driver_candidate_limit);
    println!("Fallback facilities: {}", config.dispatch.fallback_facility_limit);

    Ok(())
}

fn print_outcome(emergency_id: &str, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Dispatched(record) => {
            match record.facility.distance_km {
                Some(d) => println!(
                    "Emergency {} dispatched to facility {} ({:.2} km)",
                    emergency_id, record.facility.id, d
                ),
                None => println!(
                    "Emergency {} dispatched to facility {} (fallback)",
                    emergency_id, record.facility.id
                ),
            }
            if let Some(driver) = &record.driver {
                println!(
                    "Driver {} assigned ({:.2} km)",
                    driver.id,
                    driver.distance_km.unwrap_or_default()
                );
            }
        }
        DispatchOutcome::AlreadyHandled { status } => {
            println!("Emergency {} already processed (status: {})", emergency_id, status);
        }
        DispatchOutcome::Aborted(reason) => {
            let why = match reason {
                AbortReason::NotFound => "request not found".to_string(),
                AbortReason::MissingData(e) => format!("request data unusable: {}", e),
                AbortReason::MissingLocation => "request has no location".to_string(),
                AbortReason::InvalidLocation(e) => e.to_string(),
                AbortReason::NoFacilityAvailable => "no facility available".to_string(),
            };
            eprintln!("Emergency {} not dispatched: {}", emergency_id, why);
        }
        DispatchOutcome::Conflict => {
            eprintln!(
                "Emergency {} was dispatched concurrently; nothing written",
                emergency_id
            );
        }
    }
}
