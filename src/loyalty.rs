use crate::models::{AppointmentStatus, Service, User};

pub const DEFAULT_REWARD_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoyaltyCounters {
    pub total_appointments: i64,
    pub available_rewards: i64,
    pub used_rewards: i64,
}

impl From<&User> for LoyaltyCounters {
    fn from(user: &User) -> Self {
        Self {
            total_appointments: user.total_appointments,
            available_rewards: user.available_rewards,
            used_rewards: user.used_rewards,
        }
    }
}

impl LoyaltyCounters {
    /// Spends one reward, if any is left.
    pub fn redeem(self) -> Option<Self> {
        (self.available_rewards > 0).then(|| Self {
            available_rewards: self.available_rewards - 1,
            used_rewards: self.used_rewards + 1,
            ..self
        })
    }

    pub fn refund(self) -> Self {
        Self {
            available_rewards: self.available_rewards + 1,
            used_rewards: (self.used_rewards - 1).max(0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoyaltyPolicy {
    /// Every this many completed appointments earns one reward.
    pub threshold: i64,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_REWARD_THRESHOLD,
        }
    }
}

impl LoyaltyPolicy {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn on_status_change(
        &self,
        counters: LoyaltyCounters,
        old: AppointmentStatus,
        new: AppointmentStatus,
        reward_applied: bool,
    ) -> LoyaltyCounters {
        let mut next = counters;

        if new == AppointmentStatus::Done && old != AppointmentStatus::Done {
            next.total_appointments += 1;
            if next.total_appointments % self.threshold == 0 {
                next.available_rewards += 1;
            }
        }

        if new == AppointmentStatus::Cancelled && old != AppointmentStatus::Cancelled && reward_applied {
            next = next.refund();
        }

        if old == AppointmentStatus::Done && new != AppointmentStatus::Done {
            next.total_appointments = (next.total_appointments - 1).max(0);
            // The appointment being reverted was the one that earned a reward.
            if (next.total_appointments + 1) % self.threshold == 0 {
                next.available_rewards = (next.available_rewards - 1).max(0);
            }
        }

        next
    }
}

/// A reward pays for one "coupe + barbe" package.
pub fn is_reward_eligible(service: &Service) -> bool {
    let name = service.name.to_lowercase();
    name.contains("coupe") && name.contains("barbe")
}

/// Price covered by a reward for this selection, if it contains an eligible package.
pub fn reward_discount(services: &[Service]) -> Option<f64> {
    services
        .iter()
        .find(|s| is_reward_eligible(s))
        .map(|s| s.price)
}
