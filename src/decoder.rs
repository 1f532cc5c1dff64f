//! Decode the result lines a prober writes to its log.
//!
//! Each line is a JSON object describing one test. The prober writes a
//! final [`SENTINEL`] line once all its tests ran; anything after it is
//! ignored.

use std::{
    fmt, io,
    net::IpAddr,
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::Stream;
use pin_project::pin_project;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::internal_events::{TestResultDecodeError, TestResultReceived};

/// The line a prober writes after its last result.
pub const SENTINEL: &str = "EOF";

/// The tests a prober runs against each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestId {
    /// The prober reaching its own address.
    #[serde(rename = "self")]
    SelfCheck,
    #[serde(alias = "pod-same-node")]
    PodSameNode,
    #[serde(alias = "pod-different-node")]
    PodDifferentNode,
    #[serde(alias = "node-own")]
    NodeOwn,
    #[serde(alias = "node-different")]
    NodeDifferent,
}

impl TestId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelfCheck => "self",
            Self::PodSameNode => "pod-same-node",
            Self::PodDifferentNode => "pod-different-node",
            Self::NodeOwn => "node-own",
            Self::NodeDifferent => "node-different",
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: TestId,
    pub target_ip: IpAddr,
    pub target_name: String,
    pub success: bool,
}

/// A line that is neither a result nor the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Malformed result line {:?}: {}", line, reason))]
pub struct DecodeError {
    pub line: String,
    pub reason: String,
}

/// Why a result stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Termination {
    /// The prober wrote the sentinel.
    Sentinel,
    /// The log closed before the sentinel.
    #[default]
    Closed,
    /// Reading the log failed.
    Failed { reason: String },
    /// The run was cancelled while reading.
    Cancelled,
}

impl Termination {
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel => f.write_str("complete"),
            Self::Closed => f.write_str("log closed before end marker"),
            Self::Failed { reason } => write!(f, "log read failed: {}", reason),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Decodes a single line.
pub fn decode_line(line: &str) -> Result<TestResult, DecodeError> {
    serde_json::from_str(line).map_err(|error| DecodeError {
        line: line.to_owned(),
        reason: error.to_string(),
    })
}

/// Lazily decodes `lines` until the sentinel or the end of the stream.
pub fn decode<S>(lines: S) -> ResultStream<S>
where
    S: Stream<Item = io::Result<String>>,
{
    ResultStream {
        lines,
        termination: None,
    }
}

/// A single pass over a prober's results, in log order.
///
/// Yields one item per non-blank line. Once it returns `None`,
/// [`ResultStream::termination`] tells how the stream ended.
#[pin_project]
pub struct ResultStream<S> {
    #[pin]
    lines: S,
    termination: Option<Termination>,
}

impl<S> ResultStream<S> {
    /// How the stream ended, or `None` while it is still running.
    pub const fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }
}

impl<S> Stream for ResultStream<S>
where
    S: Stream<Item = io::Result<String>>,
{
    type Item = Result<TestResult, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if this.termination.is_some() {
            return Poll::Ready(None);
        }
        loop {
            let line = match ready!(this.lines.as_mut().poll_next(cx)) {
                Some(Ok(line)) => line,
                Some(Err(error)) => {
                    *this.termination = Some(Termination::Failed {
                        reason: error.to_string(),
                    });
                    return Poll::Ready(None);
                }
                None => {
                    *this.termination = Some(Termination::Closed);
                    return Poll::Ready(None);
                }
            };

            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line == SENTINEL {
                *this.termination = Some(Termination::Sentinel);
                return Poll::Ready(None);
            }
            if line.trim().is_empty() {
                continue;
            }

            let item = decode_line(line);
            match &item {
                Ok(result) => {
                    emit!(TestResultReceived {
                        test_id: result.test_id.as_str(),
                        target: &result.target_name,
                        success: result.success,
                    });
                }
                Err(error) => {
                    emit!(TestResultDecodeError { error });
                }
            }
            return Poll::Ready(Some(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};

    use super::*;
    use crate::test_util::result_line;

    fn lines(lines: &[&str]) -> stream::Iter<std::vec::IntoIter<io::Result<String>>> {
        let lines: Vec<_> = lines.iter().map(|line| Ok(line.to_string())).collect();
        stream::iter(lines)
    }

    async fn collect<S>(
        mut stream: ResultStream<S>,
    ) -> (Vec<Result<TestResult, DecodeError>>, Termination)
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        let termination = stream.termination().cloned().expect("stream ended");
        (items, termination)
    }

    fn result(test_id: TestId, ip: &str, name: &str, success: bool) -> TestResult {
        TestResult {
            test_id,
            target_ip: ip.parse().unwrap(),
            target_name: name.to_owned(),
            success,
        }
    }

    #[test]
    fn decodes_result_line() {
        let line = r#"{"test_id":"pod_different_node","target_ip":"10.244.2.4","target_name":"target-x7k2p","success":false}"#;
        assert_eq!(
            decode_line(line).unwrap(),
            result(TestId::PodDifferentNode, "10.244.2.4", "target-x7k2p", false)
        );
    }

    #[test]
    fn accepts_kebab_case_test_ids() {
        let line = r#"{"test_id":"node-own","target_ip":"172.18.0.2","target_name":"kind-worker","success":true}"#;
        assert_eq!(decode_line(line).unwrap().test_id, TestId::NodeOwn);
    }

    #[test]
    fn rejects_incomplete_lines() {
        let cases = [
            r#"{"test_id":"self","target_ip":"10.0.0.1","target_name":"p"}"#,
            r#"{"test_id":"pod_everywhere","target_ip":"10.0.0.1","target_name":"p","success":true}"#,
            r#"{"test_id":"self","target_ip":"not-an-ip","target_name":"p","success":true}"#,
            "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.",
        ];
        for line in cases {
            let error = decode_line(line).unwrap_err();
            assert_eq!(error.line, line);
        }
    }

    #[tokio::test]
    async fn sentinel_ends_stream_and_hides_trailing_lines() {
        let r1 = result(TestId::SelfCheck, "10.244.1.5", "prober", true);
        let r2 = result(TestId::PodSameNode, "10.244.1.9", "target-abc", true);
        let r3 = result(TestId::NodeDifferent, "172.18.0.3", "worker-2", true);
        let input = [
            result_line(&r1),
            result_line(&r2),
            "garbage".to_owned(),
            SENTINEL.to_owned(),
            result_line(&r3),
        ];
        let input: Vec<&str> = input.iter().map(String::as_str).collect();

        let (items, termination) = collect(decode(lines(&input))).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Ok(r1));
        assert_eq!(items[1], Ok(r2));
        assert_eq!(
            items[2].as_ref().unwrap_err().line,
            "garbage",
            "malformed line surfaces as an item"
        );
        assert_eq!(termination, Termination::Sentinel);
    }

    #[tokio::test]
    async fn empty_stream_reports_closed() {
        let (items, termination) = collect(decode(lines(&[]))).await;
        assert!(items.is_empty());
        assert_eq!(termination, Termination::Closed);
        assert!(!termination.is_clean());
    }

    #[tokio::test]
    async fn immediate_sentinel_is_clean() {
        let (items, termination) = collect(decode(lines(&[SENTINEL]))).await;
        assert!(items.is_empty());
        assert!(termination.is_clean());
    }

    #[tokio::test]
    async fn preserves_order() {
        let expected: Vec<_> = (1..=5)
            .map(|n| {
                result(
                    TestId::PodDifferentNode,
                    &format!("10.244.{n}.2"),
                    &format!("target-{n}"),
                    n % 2 == 0,
                )
            })
            .collect();
        let mut input: Vec<String> = expected.iter().map(result_line).collect();
        input.push(SENTINEL.to_owned());
        let input: Vec<&str> = input.iter().map(String::as_str).collect();

        let (items, _) = collect(decode(lines(&input))).await;

        let items: Vec<_> = items.into_iter().map(Result::unwrap).collect();
        similar_asserts::assert_eq!(items, expected);
    }

    #[tokio::test]
    async fn skips_blank_lines_and_carriage_returns() {
        let r1 = result(TestId::NodeOwn, "172.18.0.2", "worker-1", true);
        let input = [
            String::new(),
            format!("{}\r", result_line(&r1)),
            "   ".to_owned(),
            "EOF\r".to_owned(),
        ];
        let input: Vec<&str> = input.iter().map(String::as_str).collect();

        let (items, termination) = collect(decode(lines(&input))).await;

        assert_eq!(items, vec![Ok(r1)]);
        assert_eq!(termination, Termination::Sentinel);
    }

    #[tokio::test]
    async fn read_error_ends_stream() {
        let r1 = result(TestId::SelfCheck, "10.244.1.5", "prober", true);
        let input = stream::iter(vec![
            Ok(result_line(&r1)),
            Err(io::Error::other("connection reset")),
            Ok(SENTINEL.to_owned()),
        ]);

        let (items, termination) = collect(decode(input)).await;

        assert_eq!(items, vec![Ok(r1)]);
        assert_eq!(
            termination,
            Termination::Failed {
                reason: "connection reset".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn stays_finished_after_end() {
        let mut stream = decode(lines(&[SENTINEL, "late"]));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.termination(), Some(&Termination::Sentinel));
    }
}
