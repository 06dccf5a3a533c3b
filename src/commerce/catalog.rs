use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

use super::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Blend,
    SingleOrigin,
    Specialty,
    Pods,
    Tea,
    Sample,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blend => "blend",
            Self::SingleOrigin => "single-origin",
            Self::Specialty => "specialty",
            Self::Pods => "pods",
            Self::Tea => "tea",
            Self::Sample => "sample",
        }
    }

    /// Lenient parse: case-insensitive, `_`/space accepted for `-`, trailing `s` ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let cleaned = cleaned.trim_end_matches('s');
        [
            Self::Blend,
            Self::SingleOrigin,
            Self::Specialty,
            Self::Pods,
            Self::Tea,
            Self::Sample,
        ]
        .into_iter()
        .find(|category| category.as_str().trim_end_matches('s') == cleaned)
    }

    /// Whole-bean coffee can be ground; teas, pods and sample packs cannot.
    #[must_use]
    pub const fn takes_grind(self) -> bool {
        !matches!(self, Self::Tea | Self::Pods | Self::Sample)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub key: String,
    pub name: String,
    pub category: Category,
    /// Sizes in listing order; the first one is the default.
    pub prices: Vec<(String, Cents)>,
}

impl Product {
    #[must_use]
    pub fn new(key: &str, name: &str, category: Category, prices: &[(&str, u64)]) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            category,
            prices: prices
                .iter()
                .map(|(size, cents)| ((*size).to_string(), Cents(*cents)))
                .collect(),
        }
    }

    /// Price for `size`, ignoring case and whitespace ("1 LB" matches "1lb").
    #[must_use]
    pub fn price_for(&self, size: &str) -> Option<(&str, Cents)> {
        let wanted = normalize_size(size);
        self.prices
            .iter()
            .find(|(listed, _)| *listed == wanted)
            .map(|(listed, price)| (listed.as_str(), *price))
    }

    #[must_use]
    pub fn default_size(&self) -> Option<(&str, Cents)> {
        self.prices.first().map(|(size, price)| (size.as_str(), *price))
    }

    pub fn sizes(&self) -> impl Iterator<Item = &str> {
        self.prices.iter().map(|(size, _)| size.as_str())
    }
}

struct PriceList<'a>(&'a [(String, Cents)]);

impl Serialize for PriceList<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (size, price) in self.0 {
            map.serialize_entry(size, price)?;
        }
        map.end()
    }
}

impl Serialize for Product {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Product", 4)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("category", &self.category)?;
        state.serialize_field("prices", &PriceList(&self.prices))?;
        state.end()
    }
}

pub(crate) fn normalize_size(size: &str) -> String {
    size.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn normalize_query(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Immutable product table, built once at startup and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    #[must_use]
    pub const fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    #[must_use]
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(move |p| p.category == category)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.key == key)
    }

    /// Resolve a spoken product reference.
    ///
    /// Tiers, first match wins within each: exact key, name containment
    /// (either direction), then key containment (either direction). All
    /// comparisons use lowercase alphanumerics only, so "House Blend",
    /// "house-blend" and "houseblend" are the same query.
    #[must_use]
    pub fn resolve(&self, query: &str) -> Option<&Product> {
        let query = normalize_query(query);
        if query.is_empty() {
            return None;
        }

        if let Some(product) = self.products.iter().find(|p| normalize_query(&p.key) == query) {
            return Some(product);
        }

        let contains_either = |candidate: &str| {
            let candidate = normalize_query(candidate);
            !candidate.is_empty() && (candidate.contains(&query) || query.contains(&candidate))
        };

        self.products
            .iter()
            .find(|p| contains_either(&p.name))
            .or_else(|| self.products.iter().find(|p| contains_either(&p.key)))
    }

    /// The stock Mangy Dog Coffee line-up.
    #[must_use]
    pub fn default_coffee() -> Self {
        const BAG: &[(&str, u64)] = &[("12oz", 1999), ("1lb", 2899), ("2lb", 4999), ("5lb", 8999)];
        const TIN: &[(&str, u64)] = &[("3oz", 2099)];
        const PODS: &[(&str, u64)] = &[("12pack", 1999)];
        const SAMPLER: &[(&str, u64)] = &[("6pack", 2499)];

        use Category::{Blend, Pods, Sample, SingleOrigin, Specialty, Tea};
        Self::new(vec![
            Product::new("house-blend", "House Blend", Blend, BAG),
            Product::new("breakfast-blend", "Breakfast Blend", Blend, BAG),
            Product::new("french-roast", "French Roast", Blend, BAG),
            Product::new("italian-roast", "Italian Roast", Blend, BAG),
            Product::new("max-caf", "Max Caf Blend", Blend, BAG),
            Product::new("cold-brew", "Cold Brew Coffee", Blend, BAG),
            Product::new("colombia", "Colombia", SingleOrigin, BAG),
            Product::new("ethiopia", "Ethiopia Natural", SingleOrigin, BAG),
            Product::new("guatemala", "Guatemala", SingleOrigin, BAG),
            Product::new("peru", "Peru", SingleOrigin, BAG),
            Product::new("kenya", "Kenya", SingleOrigin, BAG),
            Product::new("bali-blue", "Bali Blue", SingleOrigin, BAG),
            Product::new("sumatra", "Sumatra", SingleOrigin, BAG),
            Product::new("mushroom-coffee", "Mushroom Coffee", Specialty, &[("12oz", 2499), ("1lb", 3499)]),
            Product::new("whiskey-barrel", "Whiskey Barrel Aged", Specialty, &[("12oz", 2999), ("1lb", 4499)]),
            Product::new("pods-mexico", "Mexico Pods (12-pack)", Pods, PODS),
            Product::new("pods-peru", "Peru Pods (12-pack)", Pods, PODS),
            Product::new("pods-bali", "Bali Pods (12-pack)", Pods, PODS),
            Product::new("english-breakfast", "English Breakfast Tea", Tea, TIN),
            Product::new("earl-grey", "Earl Grey Tea", Tea, TIN),
            Product::new("masala-chai", "Masala Chai", Tea, TIN),
            Product::new("jasmine", "Jasmine Tea", Tea, TIN),
            Product::new("moroccan-mint", "Moroccan Mint Tea", Tea, TIN),
            Product::new("matcha", "Matcha", Tea, &[("1oz", 1899)]),
            Product::new("sample-bestsellers", "Best Sellers Sample Pack", Sample, SAMPLER),
            Product::new("sample-single-origin", "Single Origin Sample Pack", Sample, SAMPLER),
            Product::new("sample-flavored", "Flavored Coffee Sample Pack", Sample, SAMPLER),
        ])
    }
}
