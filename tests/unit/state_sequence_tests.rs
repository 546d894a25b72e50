//! Randomized event-sequence tests for the state machine invariants.
//!
//! Drives the state machine through deterministic pseudo-random event
//! sequences and asserts the structural invariants hold after every single
//! transition, regardless of ordering.

use courier_gateway::client::ClientEvent;
use courier_gateway::session::state::{Phase, SessionState, Wake};

/// Small deterministic xorshift generator so failures are reproducible.
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

fn random_event(rng: &mut XorShift64, n: u64) -> ClientEvent {
    match rng.next() % 6 {
        0 => ClientEvent::PairingCode {
            code: format!("CODE-{n}"),
        },
        1 => ClientEvent::Authenticated,
        2 => ClientEvent::Ready,
        3 => ClientEvent::AuthFailure {
            reason: format!("auth failure {n}"),
        },
        4 => ClientEvent::Disconnected {
            reason: format!("drop {n}"),
        },
        _ => ClientEvent::Error {
            message: format!("error {n}"),
        },
    }
}

#[test]
fn pairing_code_present_iff_pairing_required() {
    for seed in 1..=200_u64 {
        let mut rng = XorShift64::new(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let policy = rng.next() % 2 == 0;
        let mut state = SessionState::new();

        for n in 0..64_u64 {
            let event = random_event(&mut rng, n);
            state.apply(&event, policy);

            assert_eq!(
                state.pairing_code.is_some(),
                state.phase == Phase::PairingRequired,
                "invariant violated after {event:?} (seed {seed}, step {n}): \
                 phase={:?}, code={:?}",
                state.phase,
                state.pairing_code,
            );
        }
    }
}

#[test]
fn effects_are_consistent_with_resulting_phase() {
    for seed in 1..=200_u64 {
        let mut rng = XorShift64::new(seed.wrapping_mul(0xD134_2543_DE82_EF95));
        let policy = rng.next() % 2 == 0;
        let mut state = SessionState::new();

        for n in 0..64_u64 {
            let event = random_event(&mut rng, n);
            let effects = state.apply(&event, policy);

            if effects.schedule_reconnect {
                assert_eq!(
                    state.phase,
                    Phase::Disconnected,
                    "reconnect may only be scheduled while disconnected \
                     (seed {seed}, step {n}, event {event:?})",
                );
            }
            if effects.wake == Some(Wake::Ready) {
                assert_eq!(state.phase, Phase::Ready);
            }
            if effects.wake == Some(Wake::AuthFailed) {
                assert_eq!(state.phase, Phase::AuthFailed);
            }
            assert!(
                !(effects.schedule_reconnect && effects.cancel_reconnect),
                "a single transition never schedules and cancels at once",
            );
        }
    }
}
