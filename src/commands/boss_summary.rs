// /boss_summary: rebuild the summary on demand in the configured channel.

use crate::boss_summary::Regeneration;
use crate::error::Error;

pub fn outcome_message(outcome: &Result<Regeneration, Error>) -> &'static str {
    match outcome {
        Ok(Regeneration::Posted { .. }) => "Boss summary has been regenerated.",
        Ok(Regeneration::NoPreviousSummary) => "No boss summary found to regenerate.",
        Ok(Regeneration::ChannelNotFound) => "Failed to find summary channel.",
        Err(Error::Database(_)) => "Failed to check for existing summary message.",
        Err(_) => "Failed to regenerate boss summary.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::MessengerError;

    #[test]
    fn test_messages() {
        assert_eq!(
            outcome_message(&Ok(Regeneration::Posted { message_id: 7 })),
            "Boss summary has been regenerated."
        );
        assert_eq!(
            outcome_message(&Ok(Regeneration::NoPreviousSummary)),
            "No boss summary found to regenerate."
        );
        assert_eq!(
            outcome_message(&Err(Error::Database(sqlx::Error::RowNotFound))),
            "Failed to check for existing summary message."
        );
        assert_eq!(
            outcome_message(&Err(MessengerError::NotFound("x".into()).into())),
            "Failed to regenerate boss summary."
        );
    }
}
