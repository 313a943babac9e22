//! Test fixtures shared by the integration suites

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rivalry::game::GameService;
use rivalry::metrics::MetricsCollector;
use rivalry::rating::RatingEngine;
use rivalry::types::{ContextPolicy, Game, MemberId};
use rivalry::utils::Clock;
use std::sync::{Arc, Mutex};

/// Clock that only moves when a test advances it
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

pub fn season_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 19, 0, 0).unwrap()
}

/// Service over an empty book plus the clock driving it
pub fn test_service() -> (Arc<GameService>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(season_start()));
    let metrics = Arc::new(MetricsCollector::new().expect("metrics"));
    let service = GameService::new(RatingEngine::default(), clock.clone(), metrics);
    (Arc::new(service), clock)
}

/// Service with one context and the given members, each its own individual
pub async fn guild_service(
    context: &str,
    policy: ContextPolicy,
    members: &[&str],
) -> (Arc<GameService>, Arc<ManualClock>) {
    let (service, clock) = test_service();
    service.register_context(context, policy).await.unwrap();
    for member in members {
        service
            .register_member(member, &format!("person-{member}"), context)
            .await
            .unwrap();
    }
    (service, clock)
}

pub fn ids(members: &[&str]) -> Vec<MemberId> {
    members.iter().map(|m| m.to_string()).collect()
}

/// Create a ranked game and confirm the first side as winner
pub async fn play(
    service: &GameService,
    context: &str,
    winners: &[&str],
    losers: &[&str],
) -> Game {
    let game = service
        .create_game(vec![ids(winners), ids(losers)], true, context)
        .await
        .unwrap();
    service
        .declare_winner(game.id, game.sides[0].id, true)
        .await
        .unwrap();
    service.game(game.id).await.unwrap()
}
