//! Live position feed read line by line from a text stream.
//!
//! Each line is `lat,lon` or `lat,lon,accuracy` in decimal degrees and meters. Blank lines and
//! lines starting with `#` are skipped.

use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::{FixSubscriber, PositionSource, Subscription};
use crate::core::error::SourceError;
use crate::core::model::{Coordinate, GeoFix};

lazy_static! {
    static ref FIX_LINE: Regex = Regex::new(
        r"^\s*([+-]?\d+(?:\.\d+)?)\s*,\s*([+-]?\d+(?:\.\d+)?)\s*(?:,\s*(\d+(?:\.\d+)?)\s*)?$"
    )
    .expect("Invalid fix line regex");
}

/// Live feed tuning - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveFeedSettings {
    /// Report a timeout when no line arrives for this long
    pub timeout_ms: u64,
    /// Drop fixes whose reported accuracy is worse than this
    pub max_accuracy_m: Option<f64>,
    /// A session whose last fix is older than this is reported stale
    pub stale_after_ms: u64,
}

impl Default for LiveFeedSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_accuracy_m: None,
            stale_after_ms: 15_000,
        }
    }
}

/// Parse one feed line into a coordinate and optional accuracy.
pub fn parse_fix_line(line: &str) -> Result<(Coordinate, Option<f64>), SourceError> {
    let malformed = |reason: &str| SourceError::Malformed {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let caps = FIX_LINE
        .captures(line)
        .ok_or_else(|| malformed("expected `lat,lon[,accuracy]`"))?;

    let latitude: f64 = caps[1].parse().map_err(|_| malformed("bad latitude"))?;
    let longitude: f64 = caps[2].parse().map_err(|_| malformed("bad longitude"))?;
    let accuracy = match caps.get(3) {
        Some(m) => Some(m.as_str().parse::<f64>().map_err(|_| malformed("bad accuracy"))?),
        None => None,
    };

    let coordinate = Coordinate::new(latitude, longitude);
    if !coordinate.is_valid() {
        return Err(malformed("coordinate out of range"));
    }
    Ok((coordinate, accuracy))
}

/// Adapts any async line reader (stdin, a socket, a pipe from a GPS daemon) into fixes.
///
/// There is no initial fix: the first line arrives through the subscription like every other.
pub struct LineFeedSource<R> {
    name: String,
    reader: R,
    settings: LiveFeedSettings,
}

impl<R> LineFeedSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(name: impl Into<String>, reader: R, settings: LiveFeedSettings) -> Self {
        Self {
            name: name.into(),
            reader,
            settings,
        }
    }
}

impl<R> PositionSource for LineFeedSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(self: Box<Self>, subscriber: FixSubscriber) -> Subscription {
        let task = tokio::spawn(read_feed(self.reader, self.settings, subscriber.clone()));
        subscriber.subscription(Some(task))
    }
}

async fn read_feed<R>(reader: R, settings: LiveFeedSettings, subscriber: FixSubscriber)
where
    R: AsyncBufRead + Unpin,
{
    let timeout = Duration::from_millis(settings.timeout_ms.max(1));
    // Raw segments so a line that is not UTF-8 is reported on its own instead of ending the feed
    let mut lines = reader.split(b'\n');

    loop {
        let delivered = match tokio::time::timeout(timeout, lines.next_segment()).await {
            Err(_) => subscriber.error(SourceError::Timeout(timeout)),
            Ok(Ok(Some(raw))) => match String::from_utf8(raw) {
                Err(e) => subscriber.error(SourceError::Malformed {
                    line: String::from_utf8_lossy(e.as_bytes()).trim().to_string(),
                    reason: "not valid UTF-8".to_string(),
                }),
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    match parse_fix_line(line) {
                        Ok((coordinate, accuracy)) => {
                            if let (Some(max), Some(acc)) = (settings.max_accuracy_m, accuracy) {
                                if acc > max {
                                    debug!("Dropping fix with accuracy {:.0} m (limit {:.0} m)", acc, max);
                                    continue;
                                }
                            }
                            let fix = GeoFix::now(coordinate);
                            subscriber.fix(accuracy.map_or(fix, |acc| fix.with_accuracy(acc)))
                        }
                        Err(e) => subscriber.error(e),
                    }
                }
            },
            Ok(Ok(None)) => {
                subscriber.error(SourceError::Unavailable("feed closed".to_string()));
                return;
            }
            Ok(Err(e)) => {
                warn!("Reading position feed failed: {}", e);
                subscriber.error(SourceError::Unavailable(e.to_string()));
                return;
            }
        };

        if !delivered {
            debug!("Position feed for session {} cancelled", subscriber.session());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::{SessionId, SourceEvent};
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_plain_and_accuracy_lines() {
        let (c, acc) = parse_fix_line("51.5074,-0.1278").unwrap();
        assert_eq!(c, Coordinate::new(51.5074, -0.1278));
        assert_eq!(acc, None);

        let (c, acc) = parse_fix_line("  -33.8688 , 151.2093 , 12.5 ").unwrap();
        assert_eq!(c, Coordinate::new(-33.8688, 151.2093));
        assert_eq!(acc, Some(12.5));
    }

    #[test]
    fn test_parse_rejects_garbage_and_out_of_range() {
        assert!(matches!(
            parse_fix_line("hello"),
            Err(SourceError::Malformed { .. })
        ));
        assert!(matches!(
            parse_fix_line("91.0,0.0"),
            Err(SourceError::Malformed { reason, .. }) if reason.contains("out of range")
        ));
        assert!(parse_fix_line("10,20,-5").is_err());
    }

    async fn collect(input: &'static [u8], settings: LiveFeedSettings) -> Vec<SourceEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = FixSubscriber::new(SessionId(1), tx);
        let source = LineFeedSource::new("test", BufReader::new(input), settings);
        let _subscription = Box::new(source).subscribe(subscriber);

        let mut events = Vec::new();
        while let Some(message) = rx.recv().await {
            let closed = matches!(message.event, SourceEvent::Error(SourceError::Unavailable(_)));
            events.push(message.event);
            if closed {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_feed_emits_fixes_errors_and_close() {
        let events = collect(b"# header\n10.0,20.0\n\nnot a fix\n10.5,20.5,3\n", LiveFeedSettings::default()).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], SourceEvent::Fix(f) if f.coordinate == Coordinate::new(10.0, 20.0)));
        assert!(matches!(&events[1], SourceEvent::Error(SourceError::Malformed { .. })));
        assert!(matches!(&events[2], SourceEvent::Fix(f) if f.accuracy == Some(3.0)));
        assert!(matches!(&events[3], SourceEvent::Error(SourceError::Unavailable(_))));
    }

    #[test]
    fn test_feed_has_no_initial_fix() {
        let mut source = LineFeedSource::new("test", BufReader::new(&b"1.0,1.0\n"[..]), LiveFeedSettings::default());
        assert_eq!(source.name(), "test");
        assert!(source.initial_fix().is_none());
    }

    #[tokio::test]
    async fn test_feed_survives_invalid_utf8_line() {
        let events = collect(b"\xff\xfe garbage\n10.0,20.0\n11.0,21.0\n", LiveFeedSettings::default()).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            SourceEvent::Error(SourceError::Malformed { reason, .. }) if reason.contains("UTF-8")
        ));
        assert!(matches!(&events[1], SourceEvent::Fix(f) if f.coordinate == Coordinate::new(10.0, 20.0)));
        assert!(matches!(&events[2], SourceEvent::Fix(f) if f.coordinate == Coordinate::new(11.0, 21.0)));
        assert!(matches!(&events[3], SourceEvent::Error(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_feed_drops_inaccurate_fixes() {
        let settings = LiveFeedSettings {
            max_accuracy_m: Some(50.0),
            ..LiveFeedSettings::default()
        };
        let events = collect(b"1.0,1.0,500\n2.0,2.0,20\n", settings).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SourceEvent::Fix(f) if f.coordinate == Coordinate::new(2.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_reports_timeout_and_keeps_listening() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = FixSubscriber::new(SessionId(2), tx);
        let settings = LiveFeedSettings {
            timeout_ms: 1000,
            ..LiveFeedSettings::default()
        };
        let _subscription =
            Box::new(LineFeedSource::new("duplex", BufReader::new(reader), settings)).subscribe(subscriber);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first.event,
            SourceEvent::Error(SourceError::Timeout(Duration::from_millis(1000)))
        );

        writer.write_all(b"3.0,4.0\n").await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, SourceEvent::Fix(f) if f.coordinate == Coordinate::new(3.0, 4.0)));
    }
}
