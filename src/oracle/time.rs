use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, trace};

use super::{Oracle, OracleContext};
use crate::config::EngineConfig;
use crate::models::{Comparison, OracleVerdict, Outcome, Technique};

/// Delay a TRUE response must reach: baseline latency plus the scaled sleep.
pub fn time_threshold(config: &EngineConfig, baseline_latency: Duration) -> Duration {
    baseline_latency + Duration::from_secs_f64(config.timesec as f64 * config.time_safety_factor)
}

/// Reads the answer from response latency. A slow answer is only trusted
/// after a fast negative control and a second slow answer.
pub struct TimeOracle {
    ctx: OracleContext,
    template: String,
    threshold: Duration,
}

impl TimeOracle {
    pub fn new(ctx: OracleContext, template: String, threshold: Duration) -> Self {
        Self { ctx, template, threshold }
    }

    async fn elapsed(&self, condition: &str) -> Result<Duration, String> {
        let payload = self.ctx.payload(&self.template, condition);
        self.ctx
            .send(&payload)
            .await
            .map(|response| response.elapsed)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Oracle for TimeOracle {
    fn technique(&self) -> Technique {
        Technique::Time
    }

    async fn ask(&mut self, condition: &str) -> OracleVerdict {
        let first = match self.elapsed(condition).await {
            Ok(elapsed) => elapsed,
            Err(reason) => return OracleVerdict::inconclusive(reason),
        };
        if first < self.threshold {
            trace!(condition, elapsed_ms = first.as_millis() as u64, "Time oracle answer: fast");
            return OracleVerdict::new(Outcome::False, first, format!("{}ms", first.as_millis()));
        }

        let control = {
            let n: u32 = rand::thread_rng().gen_range(1000..10000);
            format!("{}={}", n, n + 1)
        };
        match self.elapsed(&control).await {
            Ok(elapsed) if elapsed >= self.threshold => {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "Negative control was slow too");
                return OracleVerdict::new(
                    Outcome::Inconclusive,
                    first,
                    format!("negative control took {}ms", elapsed.as_millis()),
                );
            }
            Ok(_) => {}
            Err(reason) => return OracleVerdict::inconclusive(reason),
        }

        match self.elapsed(condition).await {
            Ok(second) if second >= self.threshold => {
                trace!(condition, first_ms = first.as_millis() as u64, second_ms = second.as_millis() as u64, "Time oracle answer: slow");
                OracleVerdict::new(
                    Outcome::True,
                    second,
                    format!("{}ms, repeat {}ms", first.as_millis(), second.as_millis()),
                )
            }
            Ok(second) => OracleVerdict::new(
                Outcome::Inconclusive,
                second,
                format!("slow answer ({}ms) not repeated ({}ms)", first.as_millis(), second.as_millis()),
            ),
            Err(reason) => OracleVerdict::inconclusive(reason),
        }
    }

    fn comparison(&self) -> Comparison {
        Comparison::Time {
            timesec: self.ctx.config.timesec,
            threshold_ms: self.threshold.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::http::transport::testing::{query_param, FnTransport};
    use crate::http::{discover, HttpResponse, RequestModel};

    fn context(transport: Arc<dyn crate::http::Transport>) -> OracleContext {
        let request = RequestModel::get("http://target.local/?id=1");
        let point = discover(&request).unwrap().points.remove(0);
        OracleContext::new(transport, Arc::new(request), point, Arc::new(EngineConfig::default()))
    }

    /// Sleeps (on paper) when the predicate `a=b` holds.
    fn sleepy(req: &crate::http::PreparedRequest) -> Result<HttpResponse, crate::errors::BlindsightError> {
        let id = query_param(req, "id").unwrap_or_default();
        let holds = id
            .strip_prefix("1 AND IF((")
            .and_then(|s| s.split_once("),SLEEP"))
            .and_then(|(cond, _)| cond.split_once('='))
            .is_some_and(|(l, r)| l == r);
        let elapsed = if holds { Duration::from_millis(5_100) } else { Duration::from_millis(40) };
        Ok(HttpResponse::new(200, "ok").with_elapsed(elapsed))
    }

    const TEMPLATE: &str = "[ORIGVALUE] AND IF(([INFERENCE]),SLEEP([SLEEPTIME]),0)";

    #[test]
    fn test_threshold_formula() {
        let config = EngineConfig { timesec: 5, time_safety_factor: 0.8, ..Default::default() };
        assert_eq!(time_threshold(&config, Duration::from_millis(100)), Duration::from_millis(4_100));
    }

    #[tokio::test]
    async fn test_true_needs_control_and_repeat() {
        let transport = Arc::new(FnTransport::new(sleepy));
        let mut oracle = TimeOracle::new(context(transport.clone()), TEMPLATE.into(), Duration::from_millis(4_040));

        assert_eq!(oracle.ask("4=4").await.outcome, Outcome::True);
        assert_eq!(transport.calls(), 3);
        assert_eq!(oracle.ask("4=5").await.outcome, Outcome::False);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_answers_hold_under_jitter_within_the_safety_margin() {
        let config = EngineConfig::default();
        let baseline = Duration::from_millis(100);
        let sleep = Duration::from_secs(config.timesec);
        let margin = sleep.mul_f64(1.0 - config.time_safety_factor);
        let calls = AtomicUsize::new(0);
        let transport = Arc::new(FnTransport::new(move |req| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u64;
            let jitter = Duration::from_millis((n * 379) % margin.as_millis() as u64);
            let id = query_param(req, "id").unwrap_or_default();
            let holds = id
                .strip_prefix("1 AND IF((")
                .and_then(|s| s.split_once("),SLEEP"))
                .and_then(|(cond, _)| cond.split_once('='))
                .is_some_and(|(l, r)| l == r);
            // Sleeps land short and fast answers land late, by less than the margin.
            let elapsed = if holds { baseline + sleep - jitter } else { baseline + jitter };
            Ok(HttpResponse::new(200, "ok").with_elapsed(elapsed))
        }));
        let threshold = time_threshold(&config, baseline);
        let mut oracle = TimeOracle::new(context(transport), TEMPLATE.into(), threshold);

        let mut agreed = 0;
        let pairs = 40;
        for k in 0..pairs {
            if oracle.ask(&format!("{}={}", k, k)).await.outcome == Outcome::True {
                agreed += 1;
            }
            if oracle.ask(&format!("{}={}", k, k + 1)).await.outcome == Outcome::False {
                agreed += 1;
            }
        }
        assert_eq!(agreed, 2 * pairs);
    }

    #[tokio::test]
    async fn test_slow_control_is_inconclusive() {
        let transport = Arc::new(FnTransport::new(|_| {
            Ok(HttpResponse::new(200, "ok").with_elapsed(Duration::from_secs(6)))
        }));
        let mut oracle = TimeOracle::new(context(transport), TEMPLATE.into(), Duration::from_millis(4_040));
        assert!(oracle.ask("1=1").await.is_inconclusive());
    }

    #[tokio::test]
    async fn test_unrepeated_delay_is_inconclusive() {
        let calls = AtomicUsize::new(0);
        let transport = Arc::new(FnTransport::new(move |_| {
            let slow = calls.fetch_add(1, Ordering::SeqCst) == 0;
            let elapsed = if slow { Duration::from_secs(6) } else { Duration::from_millis(30) };
            Ok(HttpResponse::new(200, "ok").with_elapsed(elapsed))
        }));
        let mut oracle = TimeOracle::new(context(transport), TEMPLATE.into(), Duration::from_millis(4_040));
        assert!(oracle.ask("1=1").await.is_inconclusive());
    }
}
