// Boss reference data behind the /boss and /keys commands.

use crate::discord::EmbedMessage;

use super::{title_case, MAX_CHOICES};

const WIKI_BASE: &str = "https://wiki.idleclans.com/index.php/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BossInfo {
    pub name: &'static str,
    pub attack_style: &'static str,
    pub attack_weakness: &'static str,
    pub wiki: &'static str,
    pub trim_colour: u32,
    pub key: &'static str,
}

pub const BOSSES: &[BossInfo] = &[
    BossInfo { name: "zeus", attack_style: "Magic", attack_weakness: "Archery", wiki: "Zeus", trim_colour: 0xFFD700, key: "godly" },
    BossInfo { name: "medusa", attack_style: "Archery", attack_weakness: "Slash", wiki: "Medusa", trim_colour: 0xD3D3D3, key: "stone" },
    BossInfo { name: "hades", attack_style: "Magic", attack_weakness: "Stab", wiki: "Hades", trim_colour: 0x0000FF, key: "underworld" },
    BossInfo { name: "griffin", attack_style: "Melee", attack_weakness: "Crush", wiki: "Griffin", trim_colour: 0xB8860B, key: "mountain" },
    BossInfo { name: "devil", attack_style: "Melee", attack_weakness: "Pound", wiki: "Devil", trim_colour: 0xFF0000, key: "burning" },
    BossInfo { name: "chimera", attack_style: "Melee", attack_weakness: "Magic", wiki: "Chimera", trim_colour: 0x00FF00, key: "mutated" },
    BossInfo { name: "sobek", attack_style: "Archery", attack_weakness: "None", wiki: "Sobek", trim_colour: 0x00FF00, key: "ancient" },
    BossInfo { name: "kronos", attack_style: "Archery,Magic,Melee", attack_weakness: "Differs(Archery,Magic,Melee)", wiki: "Kronos", trim_colour: 0x00FF00, key: "krono's book" },
    BossInfo { name: "mesines", attack_style: "Melee/Magic", attack_weakness: "Archery", wiki: "Mesines", trim_colour: 0x00FF00, key: "otherworldly" },
];

/// Case-insensitive lookup by boss name.
pub fn find_by_name(name: &str) -> Option<&'static BossInfo> {
    let name = name.to_lowercase();
    BOSSES.iter().find(|b| b.name == name)
}

/// Case-insensitive lookup by key name.
pub fn find_by_key(key: &str) -> Option<&'static BossInfo> {
    let key = key.to_lowercase();
    BOSSES.iter().find(|b| b.key == key)
}

fn choices(current: &str, field: fn(&BossInfo) -> &'static str) -> Vec<(String, String)> {
    let current = current.to_lowercase();
    BOSSES
        .iter()
        .map(field)
        .filter(|value| value.contains(current.as_str()))
        .take(MAX_CHOICES)
        .map(|value| (title_case(value), value.to_string()))
        .collect()
}

/// Autocomplete choices `(label, value)` for boss names containing `current`.
pub fn boss_choices(current: &str) -> Vec<(String, String)> {
    choices(current, |b| b.name)
}

pub fn key_choices(current: &str) -> Vec<(String, String)> {
    choices(current, |b| b.key)
}

pub fn boss_embed(requested: &str, boss: &BossInfo) -> EmbedMessage {
    EmbedMessage {
        title: title_case(requested),
        description: format!(
            "Key needed: **{}**\nAttack style: 🛡️{}\nAttack style weakness: ⚔️{}",
            title_case(boss.key),
            boss.attack_style,
            boss.attack_weakness
        ),
        url: Some(format!("{WIKI_BASE}{}", boss.wiki)),
        colour: boss.trim_colour,
        ..Default::default()
    }
}

pub fn key_embed(requested: &str, boss: &BossInfo) -> EmbedMessage {
    EmbedMessage {
        title: format!("{requested} key"),
        description: format!(
            "**{}**\nAttack style: 🛡️{}\nAttack style weakness: ⚔️{}",
            title_case(boss.name),
            boss.attack_style,
            boss.attack_weakness
        ),
        url: Some(format!("{WIKI_BASE}{}", boss.wiki)),
        colour: boss.trim_colour,
        ..Default::default()
    }
}
