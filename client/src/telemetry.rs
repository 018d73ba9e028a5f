//! Round-trip time and packet loss estimates for the server link.

use shared::ack_covers;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Smoothing gains for RTT and its variance.
const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
struct SentPacket {
    seq: u16,
    sent_at: Instant,
    acked: bool,
}

/// RTT is fed from reliable-message acknowledgments; loss is derived from which of
/// our packet sequences the server's ack windows ever covered.
#[derive(Debug, Clone)]
pub struct LinkTelemetry {
    srtt: Option<Duration>,
    rtt_var: Duration,
    latest_rtt: Option<Duration>,
    sent: VecDeque<SentPacket>,
    horizon: Duration,
    grace: Duration,
}

impl LinkTelemetry {
    /// `horizon` bounds the loss window; packets younger than `grace` are still in flight
    /// and do not count yet.
    pub fn new(horizon: Duration, grace: Duration) -> Self {
        Self {
            srtt: None,
            rtt_var: Duration::ZERO,
            latest_rtt: None,
            sent: VecDeque::new(),
            horizon,
            grace,
        }
    }

    pub fn record_sent(&mut self, seq: u16, now: Instant) {
        self.sent.push_back(SentPacket {
            seq,
            sent_at: now,
            acked: false,
        });
        self.prune(now);
    }

    /// Marks every tracked packet covered by a received `(ack, ack_bits)` pair.
    pub fn record_ack(&mut self, ack: u16, ack_bits: u32) {
        for packet in self.sent.iter_mut().filter(|p| !p.acked) {
            if ack_covers(ack, ack_bits, packet.seq) {
                packet.acked = true;
            }
        }
    }

    pub fn record_rtt(&mut self, sample: Duration) {
        self.latest_rtt = Some(sample);
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rtt_var = sample / 2;
            }
            Some(srtt) => {
                let srtt_s = srtt.as_secs_f64();
                let sample_s = sample.as_secs_f64();
                let var_s = (1.0 - BETA) * self.rtt_var.as_secs_f64()
                    + BETA * (srtt_s - sample_s).abs();
                self.rtt_var = Duration::from_secs_f64(var_s);
                self.srtt = Some(Duration::from_secs_f64(
                    (1.0 - ALPHA) * srtt_s + ALPHA * sample_s,
                ));
            }
        }
    }

    /// Smoothed round-trip time, once at least one sample arrived.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    pub fn rtt_var(&self) -> Duration {
        self.rtt_var
    }

    pub fn latest_rtt(&self) -> Option<Duration> {
        self.latest_rtt
    }

    /// Fraction of settled packets in the horizon that were never acknowledged.
    pub fn loss_rate(&self, now: Instant) -> f32 {
        let settled = self.sent.iter().filter(|p| {
            let age = now.saturating_duration_since(p.sent_at);
            age >= self.grace && age <= self.horizon
        });
        let (total, lost) = settled.fold((0u32, 0u32), |(total, lost), p| {
            (total + 1, lost + u32::from(!p.acked))
        });
        if total == 0 {
            0.0
        } else {
            lost as f32 / total as f32
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.sent.front() {
            if now.saturating_duration_since(front.sent_at) > self.horizon {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn telemetry() -> LinkTelemetry {
        LinkTelemetry::new(Duration::from_secs(2), Duration::from_millis(500))
    }

    #[test]
    fn test_first_rtt_sample_seeds_estimate() {
        let mut t = telemetry();
        assert!(t.srtt().is_none());
        t.record_rtt(Duration::from_millis(80));
        assert_eq!(t.srtt(), Some(Duration::from_millis(80)));
        assert_eq!(t.rtt_var(), Duration::from_millis(40));
    }

    #[test]
    fn test_rtt_smoothing() {
        let mut t = telemetry();
        t.record_rtt(Duration::from_millis(100));
        t.record_rtt(Duration::from_millis(200));
        let srtt = t.srtt().unwrap().as_secs_f64() * 1000.0;
        assert_approx_eq!(srtt, 112.5, 0.01);
        let var = t.rtt_var().as_secs_f64() * 1000.0;
        assert_approx_eq!(var, 0.75 * 50.0 + 0.25 * 100.0, 0.01);
        assert_eq!(t.latest_rtt(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_no_loss_without_settled_packets() {
        let mut t = telemetry();
        let now = Instant::now();
        t.record_sent(1, now);
        assert_eq!(t.loss_rate(now), 0.0);
    }

    #[test]
    fn test_loss_counts_unacked_settled_packets() {
        let mut t = telemetry();
        let start = Instant::now();
        for seq in 1..=4 {
            t.record_sent(seq, start);
        }
        // 4 acked directly, 2 via bit 1; 1 and 3 missing
        t.record_ack(4, 0b10);

        let later = start + Duration::from_secs(1);
        assert_approx_eq!(t.loss_rate(later), 0.5);
    }

    #[test]
    fn test_in_flight_packets_excluded() {
        let mut t = telemetry();
        let start = Instant::now();
        t.record_sent(1, start);
        t.record_ack(1, 0);
        t.record_sent(2, start + Duration::from_millis(900));

        // packet 2 is 100ms old, still inside the grace period
        assert_eq!(t.loss_rate(start + Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn test_old_packets_leave_horizon() {
        let mut t = telemetry();
        let start = Instant::now();
        t.record_sent(1, start);
        let later = start + Duration::from_secs(3);
        t.record_sent(2, later);
        t.record_ack(2, 0);
        assert_eq!(t.loss_rate(later + Duration::from_secs(1)), 0.0);
    }
}
