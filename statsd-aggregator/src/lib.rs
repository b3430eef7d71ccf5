//! A StatsD-compatible metric aggregation engine that flushes to Graphite.
//!
//! # Usage
//!
//! Messages in the StatsD wire format are fed to a [`MessageProcessor`], which keeps aggregated state per metric and
//! periodically turns it into Graphite datapoints:
//!
//! ```
//! # use std::time::Duration;
//! # use statsd_aggregator::ProcessorBuilder;
//! let mut processor = ProcessorBuilder::new().build().expect("failed to build processor");
//!
//! processor.process(b"gorets:17|c");
//! processor.process(b"glork:320|ms");
//! processor.process(b"not a message");
//! assert_eq!(processor.bad_lines(), 1);
//!
//! let datapoints = processor.flush(Duration::from_secs(10), 90);
//! assert_eq!(datapoints[0].path, "stats.gorets");
//! assert_eq!(datapoints[0].value, 1.7);
//! ```
//!
//! Most users will instead want to [`spawn`](ProcessorBuilder::spawn) the processor, which starts a background thread
//! that ticks meters and flushes on a fixed interval, handing Graphite plaintext payloads to a [`FlushSink`]:
//!
//! ```no_run
//! # use std::{io::Write as _, net::TcpStream};
//! # use statsd_aggregator::ProcessorBuilder;
//! let mut carbon = TcpStream::connect("127.0.0.1:2003").expect("failed to connect");
//! let processor = ProcessorBuilder::new()
//!     .spawn(move |payload: &[u8]| carbon.write_all(payload))
//!     .expect("failed to spawn processor");
//!
//! processor.process(b"gorets:1|c|@0.1");
//! ```
//!
//! # Metric types
//!
//! | type | example                | reported as                                                               |
//! |------|------------------------|---------------------------------------------------------------------------|
//! | `c`  | `gorets:1\|c\|@0.1`    | `stats.<key>` (per second) and `stats_counts.<key>`                       |
//! | `ms` | `glork:320\|ms`        | `stats.timers.<key>.{count,mean,median,upper_90,...}`                     |
//! | `g`  | `temp:21.5\|g`         | `stats.gauge.<key>.value`, once per value received                        |
//! | `m`  | `hits:1\|m`            | `stats.meter.<key>.{count,mean_rate,1min_rate,5min_rate,15min_rate}`      |
//! | `pd` | `users:alice\|pd`      | `stats.pdistinct.<key>.{count,count_1min,count_1hour,count_1day}`         |
//! | `sli`| `api:120\|sli\|3`      | `stats.SLI.<key>.{count,error,count_<label>}`                             |
//!
//! Further metric types can be added by registering a [`MetricFactory`].
//!
//! # Statistics
//!
//! Timers keep exact counts, sums, extremes and variance, and compute percentiles over a bounded random sample of
//! 1028 durations. See [`ReservoirPolicy`] for how that sample evolves across flushes. Distinct counts are
//! probabilistic estimates in fixed memory, typically within 15% of the true count.

#![deny(clippy::all)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, ProcessorBuilder};

mod key;
pub use self::key::normalize_key;

pub mod message;
pub use self::message::{Message, MetricKind, ParseError};

pub mod plugin;
pub use self::plugin::{ConfigError, MetricFactory, PluginMetric, PluginOptions, PluginRegistry};

mod processor;
pub use self::processor::{MessageProcessor, SharedProcessor};

pub mod reporter;
pub use self::reporter::{Datapoint, ReservoirPolicy};

mod scheduler;
pub use self::scheduler::{FlushReport, FlushSink};

mod telemetry;
pub use self::telemetry::{FlushKind, FlushStats, ReceiveStats};

mod timer;
pub use self::timer::ScopedTimer;

mod writer;
pub use self::writer::{GraphiteWriter, Payloads, WriteResult};
