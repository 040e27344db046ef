// /market-food: cheapest healing per HP on the player market.

use std::collections::HashMap;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::discord::{EmbedField, EmbedMessage};
use crate::http::{FetchError, JsonFetcher};

use super::title_case;

pub const MARKET_PRICES_URL: &str =
    "https://query.idleclans.com/api/PlayerMarket/items/prices/latest?includeAveragePrice=true";

/// Food item, HP healed, market item id.
pub const FOODS: &[(&str, u32, u32)] = &[
    ("cooked_piranha", 2, 160),
    ("cooked_perch", 3, 102),
    ("cooked_mackerel", 4, 100),
    ("cooked_cod", 6, 164),
    ("cooked_trout", 7, 104),
    ("cooked_salmon", 8, 105),
    ("cooked_carp", 10, 106),
    ("cooked_zander", 12, 158),
    ("cooked_pufferfish", 14, 162),
    ("cooked_anglerfish", 16, 156),
    ("cooked_tuna", 17, 562),
    ("cooked_bloodmoon_eel", 24, 888),
    ("cooked_meat", 4, 114),
    ("cooked_giant_meat", 8, 115),
    ("cooked_quality_meat", 12, 116),
    ("cooked_superior_meat", 18, 117),
    ("cooked_apex_meat", 20, 906),
    ("potato_soup", 5, 140),
    ("meat_burger", 7, 141),
    ("cod_soup", 10, 143),
    ("blueberry_pie", 11, 144),
    ("salmon_salad", 14, 145),
    ("porcini_soup", 17, 146),
    ("stew", 19, 559),
    ("power_pizza", 22, 148),
];

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    pub item_id: u32,
    pub lowest_sell_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodValue {
    pub name: &'static str,
    pub healing: u32,
    pub price: f64,
    pub cost_per_hp: f64,
}

/// Reads the latest lowest-sell prices from the market API.
#[derive(Clone)]
pub struct MarketClient {
    fetcher: JsonFetcher,
    url: String,
}

impl MarketClient {
    pub fn new(fetcher: JsonFetcher, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }

    /// Item id to lowest sell price.
    pub async fn latest_prices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<u32, f64>, FetchError> {
        let prices: Vec<MarketPrice> = self.fetcher.get_json(&self.url, cancel).await?;
        Ok(prices
            .into_iter()
            .map(|p| (p.item_id, p.lowest_sell_price))
            .collect())
    }
}

/// Cost per HP for every known food with a positive price, cheapest first.
pub fn calculate_food_values(prices: &HashMap<u32, f64>) -> Vec<FoodValue> {
    let mut values: Vec<FoodValue> = FOODS
        .iter()
        .filter_map(|&(name, healing, item_id)| {
            let Some(&price) = prices.get(&item_id) else {
                tracing::debug!(food = name, "No market price");
                return None;
            };
            if price <= 0.0 {
                tracing::debug!(food = name, price, "Ignoring non-positive price");
                return None;
            }
            Some(FoodValue {
                name,
                healing,
                price,
                cost_per_hp: price / healing as f64,
            })
        })
        .collect();

    values.sort_by(|a, b| a.cost_per_hp.total_cmp(&b.cost_per_hp));
    values
}

/// Drop every item for which another heals at least as much for strictly
/// less gold per HP.
pub fn filter_dominated(values: Vec<FoodValue>) -> Vec<FoodValue> {
    let dominated: Vec<bool> = values
        .iter()
        .map(|item| {
            values
                .iter()
                .any(|other| other.healing >= item.healing && other.cost_per_hp < item.cost_per_hp)
        })
        .collect();

    values
        .into_iter()
        .zip(dominated)
        .filter_map(|(item, dominated)| (!dominated).then_some(item))
        .collect()
}

pub fn food_embed(values: &[FoodValue]) -> EmbedMessage {
    EmbedMessage {
        title: "Market Food Values - Cost Effective Options".into(),
        description: format!(
            "Showing {} economically viable food items based on current market prices",
            values.len()
        ),
        colour: 0x00FF00,
        fields: values
            .iter()
            .map(|v| EmbedField {
                name: title_case(&v.name.replace('_', " ")),
                value: format!(
                    "Healing: **{} HP** | Price: **{:.2} gold** | Cost: **{:.2} g/HP**",
                    v.healing, v.price, v.cost_per_hp
                ),
                inline: true,
            })
            .collect(),
        footer: Some("Data from Idle Clans market API".into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(name: &'static str, healing: u32, price: f64) -> FoodValue {
        FoodValue {
            name,
            healing,
            price,
            cost_per_hp: price / healing as f64,
        }
    }

    #[test]
    fn test_values_skip_missing_and_non_positive_prices() {
        let prices = HashMap::from([(160, 10.0), (102, 0.0), (100, -3.0), (562, 34.0)]);
        let values = calculate_food_values(&prices);
        let names: Vec<&str> = values.iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["cooked_tuna", "cooked_piranha"]);
        assert_eq!(values[0].cost_per_hp, 2.0);
        assert_eq!(values[1].cost_per_hp, 5.0);
    }

    #[test]
    fn test_dominated_items_removed() {
        let values = vec![
            food("cooked_tuna", 17, 34.0),   // 2.0 g/HP
            food("cooked_cod", 6, 18.0),     // 3.0, dominated by tuna
            food("power_pizza", 22, 66.0),   // 3.0, heals more: kept
            food("cooked_piranha", 2, 10.0), // 5.0, dominated
        ];
        let kept: Vec<&str> = filter_dominated(values).iter().map(|v| v.name).collect();
        assert_eq!(kept, vec!["cooked_tuna", "power_pizza"]);
    }

    #[test]
    fn test_equal_cost_does_not_dominate() {
        let values = vec![food("stew", 19, 38.0), food("cooked_apex_meat", 20, 40.0)];
        assert_eq!(filter_dominated(values).len(), 2);
    }

    #[test]
    fn test_embed_fields() {
        let embed = food_embed(&[food("cooked_bloodmoon_eel", 24, 60.0)]);
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].name, "Cooked Bloodmoon Eel");
        assert_eq!(
            embed.fields[0].value,
            "Healing: **24 HP** | Price: **60.00 gold** | Cost: **2.50 g/HP**"
        );
        assert!(embed.description.starts_with("Showing 1 "));
    }

    #[test]
    fn test_decodes_market_payload() {
        let prices: Vec<MarketPrice> = serde_json::from_str(
            r#"[{"itemId": 562, "lowestSellPrice": 34.5, "averagePrice": 40.1}]"#,
        )
        .unwrap();
        assert_eq!(prices[0].item_id, 562);
        assert_eq!(prices[0].lowest_sell_price, 34.5);
    }
}
