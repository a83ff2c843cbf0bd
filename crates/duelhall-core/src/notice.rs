//! Player-facing notice text.

use crate::types::ParticipantId;

/// Public announcement of a decided duel.
pub fn resolution(victor: &ParticipantId, loser: &ParticipantId) -> String {
    format!("{victor} has defeated {loser} in a duel!")
}

/// Sent to the requester when their unanswered offer lapses.
pub fn expired(respondent: &ParticipantId) -> String {
    format!("Your duel offer to {respondent} has expired")
}

/// Sent to the respondent when the requester withdraws.
pub fn withdrawn(requester: &ParticipantId) -> String {
    format!("{requester} has withdrawn their duel offer")
}

/// Sent to the requester when the respondent turns the offer down.
pub fn declined(respondent: &ParticipantId) -> String {
    format!("{respondent} has declined your duel offer")
}

/// Sent to the remaining participant when the other one leaves.
pub fn called_off(other: &ParticipantId) -> String {
    format!("Your duel with {other} was called off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_name_the_other_party() {
        let rhea = ParticipantId::new("rhea");
        let cato = ParticipantId::new("cato");
        assert_eq!(resolution(&rhea, &cato), "rhea has defeated cato in a duel!");
        assert_eq!(expired(&cato), "Your duel offer to cato has expired");
        assert_eq!(withdrawn(&rhea), "rhea has withdrawn their duel offer");
        assert_eq!(declined(&cato), "cato has declined your duel offer");
        assert_eq!(called_off(&cato), "Your duel with cato was called off");
    }
}
