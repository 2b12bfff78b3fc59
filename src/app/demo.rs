//! Demonstration pipeline
//!
//! ```text
//!                    ┌──▶ relay ──(Summary)──▶ report
//!  sensors ─(Reading, Alarm)
//!                    └──▶ audit (dyn Event)
//! ```
//!
//! The sensor thread publishes synthetic readings and raises an alarm for
//! every reading at or above the threshold. The relay keeps running
//! statistics and republishes a summary every few readings plus a final one
//! before it ends its own publication. The audit subscriber receives both
//! payload types through a single `dyn Event` subscription.

use crate::app::cli::args::DemoSettings;
use crate::core::error_handling::{ContextualError, Severity};
use crate::pubsub::api::{
    BoxError, ConnectOptions, PipelineError, PipelineResult, Publisher, Subscriber, TypeRelations,
    Worker,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Common view of everything a sensor emits
pub trait Event: Send + Sync {
    fn sensor(&self) -> usize;
    fn kind(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub sensor: usize,
    pub sequence: usize,
    pub value: f64,
    pub taken_at: DateTime<Utc>,
}

impl Event for Reading {
    fn sensor(&self) -> usize {
        self.sensor
    }

    fn kind(&self) -> &'static str {
        "reading"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alarm {
    pub sensor: usize,
    pub value: f64,
    pub threshold: f64,
    pub raised_at: DateTime<Utc>,
}

impl Event for Alarm {
    fn sensor(&self) -> usize {
        self.sensor
    }

    fn kind(&self) -> &'static str {
        "alarm"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub readings: usize,
    pub alarms: usize,
    pub average: f64,
    pub maximum: f64,
    pub produced_at: DateTime<Utc>,
    pub is_final: bool,
}

/// What each stage observed, printed by the binary
#[derive(Debug, Default, Serialize)]
pub struct DemoReport {
    pub readings_published: usize,
    pub alarms_published: usize,
    pub events_audited: BTreeMap<&'static str, usize>,
    pub summaries: Vec<Summary>,
}

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("could not start thread '{name}': {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    #[error("thread '{name}' panicked")]
    Panicked { name: String },
}

impl ContextualError for DemoError {
    fn is_user_actionable(&self) -> bool {
        match self {
            DemoError::Pipeline(error) => error.is_user_actionable(),
            _ => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            DemoError::Pipeline(error) => error.user_message(),
            _ => None,
        }
    }

    fn message_id(&self) -> &'static str {
        match self {
            DemoError::Pipeline(error) => error.message_id(),
            DemoError::Spawn { .. } => "F0401",
            DemoError::Panicked { .. } => "F0402",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            DemoError::Pipeline(error) => error.severity(),
            _ => Severity::Fatal,
        }
    }
}

/// Deterministic stand-in for a sensor measurement, in 40.0..100.0
pub fn sample_value(sensor: usize, sequence: usize) -> f64 {
    40.0 + ((sensor * 37 + sequence * 13) % 60) as f64
}

pub fn event_relations() -> TypeRelations {
    TypeRelations::new()
        .derives::<Reading, dyn Event>(|reading| reading)
        .derives::<Alarm, dyn Event>(|alarm| alarm)
}

fn produce(publisher: &Publisher, settings: &DemoSettings) -> Result<(usize, usize), BoxError> {
    let (mut readings, mut alarms) = (0, 0);
    for sequence in 0..settings.readings {
        for sensor in 0..settings.sensors {
            let value = sample_value(sensor, sequence);
            publisher.publish::<Reading>(Reading {
                sensor,
                sequence,
                value,
                taken_at: Utc::now(),
            })?;
            readings += 1;

            if value >= settings.alarm_threshold {
                publisher.publish::<Alarm>(Alarm {
                    sensor,
                    value,
                    threshold: settings.alarm_threshold,
                    raised_at: Utc::now(),
                })?;
                alarms += 1;
            }
        }
    }
    Ok((readings, alarms))
}

struct Relay {
    out: Publisher,
    summary_every: usize,
    since_summary: usize,
    readings: usize,
    alarms: usize,
    total: f64,
    maximum: f64,
}

impl Relay {
    fn new(out: Publisher, summary_every: usize) -> Self {
        Self {
            out,
            summary_every,
            since_summary: 0,
            readings: 0,
            alarms: 0,
            total: 0.0,
            maximum: f64::NEG_INFINITY,
        }
    }

    fn on_reading(&mut self, reading: Arc<Reading>) -> Result<(), BoxError> {
        self.readings += 1;
        self.since_summary += 1;
        self.total += reading.value;
        self.maximum = self.maximum.max(reading.value);

        if self.since_summary >= self.summary_every {
            self.emit(false)?;
        }
        Ok(())
    }

    fn on_alarm(&mut self, alarm: Arc<Alarm>) -> Result<(), BoxError> {
        self.alarms += 1;
        log::warn!(
            "sensor {} alarm: {:.1} >= {:.1}",
            alarm.sensor,
            alarm.value,
            alarm.threshold
        );
        Ok(())
    }

    fn emit(&mut self, is_final: bool) -> Result<(), BoxError> {
        self.since_summary = 0;
        let average = if self.readings == 0 {
            0.0
        } else {
            self.total / self.readings as f64
        };
        self.out.publish::<Summary>(Summary {
            readings: self.readings,
            alarms: self.alarms,
            average,
            maximum: if self.readings == 0 { 0.0 } else { self.maximum },
            produced_at: Utc::now(),
            is_final,
        })?;
        Ok(())
    }
}

impl Worker for Relay {
    fn before_end_publication(&mut self) -> Result<(), BoxError> {
        self.emit(true)
    }
}

#[derive(Default)]
struct Report {
    summaries: Vec<Summary>,
}

impl Report {
    fn on_summary(&mut self, summary: Arc<Summary>) -> Result<(), BoxError> {
        log::info!(
            "{} readings, {} alarms, average {:.2}, max {:.1}{}",
            summary.readings,
            summary.alarms,
            summary.average,
            summary.maximum,
            if summary.is_final { " (final)" } else { "" }
        );
        self.summaries.push(Summary::clone(&summary));
        Ok(())
    }
}

impl Worker for Report {
    fn before_end_thread(&mut self) -> Result<(), BoxError> {
        log::debug!("report collected {} summaries", self.summaries.len());
        Ok(())
    }
}

#[derive(Default)]
struct Audit {
    counts: BTreeMap<&'static str, usize>,
}

impl Audit {
    fn on_event(&mut self, event: Arc<dyn Event>) -> Result<(), BoxError> {
        log::trace!("audit: {} from sensor {}", event.kind(), event.sensor());
        *self.counts.entry(event.kind()).or_default() += 1;
        Ok(())
    }
}

impl Worker for Audit {}

fn spawn_subscriber<W: Worker>(
    name: &str,
    subscriber: Subscriber<W>,
) -> Result<JoinHandle<PipelineResult<W>>, DemoError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || subscriber.run())
        .map_err(|source| DemoError::Spawn {
            name: name.to_string(),
            source,
        })
}

fn join<T>(name: &str, handle: JoinHandle<T>) -> Result<T, DemoError> {
    handle.join().map_err(|_| DemoError::Panicked {
        name: name.to_string(),
    })
}

/// Wire the pipeline, run every stage on its own thread and collect results
pub fn run(settings: &DemoSettings) -> Result<DemoReport, DemoError> {
    let sensors = Publisher::builder("sensors")
        .publishes::<Reading>()
        .publishes::<Alarm>()
        .build();
    let summaries = Publisher::builder("relay").publishes::<Summary>().build();

    let relay = Subscriber::builder("relay", Relay::new(summaries.clone(), settings.summary_every))
        .settings(&settings.pipeline)
        .subscribe::<Reading, _>(Relay::on_reading)
        .subscribe::<Alarm, _>(Relay::on_alarm)
        .downstream(summaries.clone())
        .build();
    let report = Subscriber::builder("report", Report::default())
        .settings(&settings.pipeline)
        .subscribe::<Summary, _>(Report::on_summary)
        .build();
    let audit = Subscriber::builder("audit", Audit::default())
        .settings(&settings.pipeline)
        .subscribe::<dyn Event, _>(Audit::on_event)
        .build();

    // Connect everything before any thread starts: a subscriber with no
    // live publication stops as soon as it runs.
    summaries.connect(&report, &ConnectOptions::exact())?;
    sensors.connect(&relay, &ConnectOptions::exact())?;
    sensors.connect(
        &audit,
        &ConnectOptions::with_relations(event_relations()).with_convertible(false),
    )?;
    drop(summaries);

    let report = spawn_subscriber("report", report)?;
    let audit = spawn_subscriber("audit", audit)?;
    let relay = spawn_subscriber("relay", relay)?;

    let producer_settings = settings.clone();
    let producer = thread::Builder::new()
        .name("sensors".to_string())
        .spawn(move || {
            let mut published = (0, 0);
            sensors.run(|p| {
                published = produce(p, &producer_settings)?;
                Ok(())
            })?;
            Ok::<_, PipelineError>(published)
        })
        .map_err(|source| DemoError::Spawn {
            name: "sensors".to_string(),
            source,
        })?;

    let (readings_published, alarms_published) = join("sensors", producer)??;
    let relay = join("relay", relay)??;
    let audit = join("audit", audit)??;
    let report = join("report", report)??;

    log::debug!(
        "relay processed {} readings and {} alarms",
        relay.readings,
        relay.alarms
    );
    Ok(DemoReport {
        readings_published,
        alarms_published,
        events_audited: audit.counts,
        summaries: report.summaries,
    })
}
