use rust_decimal::Decimal;

use leadgate_core::config::PipelineConfig;
use leadgate_core::domain::lead::LeadMemory;
use leadgate_core::domain::strategy::{DecisionSource, StrategyDecision, Tactic};

pub const BUDGET_UNCONFIRMED: &str = "budget_unconfirmed";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    Pass,
    Downgrade { reason_code: &'static str, from: Tactic, to: Tactic },
}

impl GateVerdict {
    pub fn is_downgrade(&self) -> bool {
        matches!(self, Self::Downgrade { .. })
    }
}

/// Deterministic veto applied after the strategist and before anything
/// irreversible. `allow-meeting` survives only when the budget flag is
/// exactly `true`; no other field and no configuration can override this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyGate {
    price_floor: Decimal,
    currency: String,
}

impl SafetyGate {
    pub fn new(pipeline: &PipelineConfig) -> Self {
        Self { price_floor: pipeline.price_floor, currency: pipeline.currency.clone() }
    }

    pub fn enforce(&self, decision: &mut StrategyDecision, memory: &LeadMemory) -> GateVerdict {
        if decision.tactic != Tactic::AllowMeeting || memory.budget_is_confirmed() {
            return GateVerdict::Pass;
        }

        let from = decision.tactic;
        decision.tactic = Tactic::AnchorPrice;
        decision.target_field = None;
        decision.source = DecisionSource::Gate;
        decision.directive = format!(
            "Todavía no hay confirmación de presupuesto. No ofrezcas agendar ni menciones \
             calendario. Indica que los proyectos parten desde {} {} y que la cifra final escala \
             según el desorden de sus datos. Pide una confirmación explícita de ese rango antes \
             de hablar de una reunión.",
            self.price_floor.normalize(),
            self.currency
        );

        GateVerdict::Downgrade { reason_code: BUDGET_UNCONFIRMED, from, to: Tactic::AnchorPrice }
    }
}

#[cfg(test)]
mod tests {
    use leadgate_core::config::AppConfig;
    use leadgate_core::domain::lead::{LeadMemory, PurchaseIntent, Urgency};
    use leadgate_core::domain::strategy::{DecisionSource, StrategyDecision, Tactic};

    use super::{GateVerdict, SafetyGate, BUDGET_UNCONFIRMED};

    const ALL_TACTICS: [Tactic; 6] = [
        Tactic::Investigate,
        Tactic::Educate,
        Tactic::AnchorPrice,
        Tactic::AllowMeeting,
        Tactic::ValueProposition,
        Tactic::Reject,
    ];

    fn gate() -> SafetyGate {
        SafetyGate::new(&AppConfig::default().pipeline)
    }

    fn proposal(tactic: Tactic) -> StrategyDecision {
        StrategyDecision::new(tactic, "propuesta del estratega", DecisionSource::Model)
    }

    #[test]
    fn allow_meeting_without_exact_true_is_downgraded() {
        for budget in [None, Some(false)] {
            let memory = LeadMemory {
                organization: Some("Acme".to_string()),
                pain: Some("stock loss".to_string()),
                urgency: Some(Urgency::High),
                intent: Some(PurchaseIntent::Appointment),
                budget_confirmed: budget,
                ..LeadMemory::default()
            };
            let mut decision = proposal(Tactic::AllowMeeting);

            let verdict = gate().enforce(&mut decision, &memory);

            assert_eq!(
                verdict,
                GateVerdict::Downgrade {
                    reason_code: BUDGET_UNCONFIRMED,
                    from: Tactic::AllowMeeting,
                    to: Tactic::AnchorPrice,
                }
            );
            assert_eq!(decision.tactic, Tactic::AnchorPrice);
            assert_eq!(decision.source, DecisionSource::Gate);
            assert!(decision.directive.contains("1500 USD"));
            assert!(decision.directive.contains("confirmación explícita"));
        }
    }

    #[test]
    fn allow_meeting_with_confirmed_budget_passes_unchanged() {
        let memory = LeadMemory { budget_confirmed: Some(true), ..LeadMemory::default() };
        let mut decision = proposal(Tactic::AllowMeeting);
        let before = decision.clone();

        assert_eq!(gate().enforce(&mut decision, &memory), GateVerdict::Pass);
        assert_eq!(decision, before);
    }

    #[test]
    fn other_tactics_always_pass() {
        for budget in [None, Some(false), Some(true)] {
            let memory = LeadMemory { budget_confirmed: budget, ..LeadMemory::default() };
            for tactic in ALL_TACTICS.into_iter().filter(|tactic| *tactic != Tactic::AllowMeeting) {
                let mut decision = proposal(tactic);
                let verdict = gate().enforce(&mut decision, &memory);
                assert!(!verdict.is_downgrade(), "{tactic} should pass");
                assert_eq!(decision.tactic, tactic);
            }
        }
    }
}
