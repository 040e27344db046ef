// Clan roster: in-game member names mapped to Discord identities.

use std::collections::HashMap;

/// Game name, Discord display name, Discord user id.
pub const MEMBERS: &[(&str, &str, u64)] = &[
    ("ImaKlutz", "ImaKlutz", 270655486318215168),
    ("guildan", "Guildan", 199632692231274496),
    ("Charlster", "Gagnon54", 409718701236158465),
    ("moraxam", "Morax", 344994648059674624),
    ("yothos", "yothos", 448261978469695489),
    ("Choufleur", "Steph", 229776173146570755),
    ("g4m3f4c3", "g4m3f4c3", 298522549661466625),
    ("Oliiviier", "oli", 350298028902711308),
];

/// Discord user id to summary display name, built fresh per call.
pub fn display_names_by_user_id() -> HashMap<u64, String> {
    MEMBERS
        .iter()
        .map(|(_, display, id)| (*id, display.to_string()))
        .collect()
}

/// Discord mention for an in-game member name, if the member is known.
pub fn mention_for_member(game_name: &str) -> Option<String> {
    MEMBERS
        .iter()
        .find(|(name, _, _)| *name == game_name)
        .map(|(_, _, id)| format!("<@{id}>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_cover_every_member() {
        let names = display_names_by_user_id();
        assert_eq!(names.len(), MEMBERS.len());
        assert_eq!(names[&409718701236158465], "Gagnon54");
    }

    #[test]
    fn test_mentions() {
        assert_eq!(
            mention_for_member("Oliiviier").as_deref(),
            Some("<@350298028902711308>")
        );
        assert_eq!(mention_for_member("oliiviier"), None);
    }
}
