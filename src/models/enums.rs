use serde::{Deserialize, Serialize};

use crate::pipeline::forecasting::ForecastError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ForecastError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ForecastError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Trend {
    Increasing => "increasing",
    Decreasing => "decreasing",
    Stable => "stable",
});

str_enum!(CardCategory {
    FoodHandler => "food_handler",
    NonFoodHandler => "non_food_handler",
    Entertainment => "entertainment",
    All => "all",
});

impl CardCategory {
    /// Map a persistence-layer service category identifier to a card category.
    ///
    /// Case-insensitive; `-`, `_` and spaces are interchangeable. Colour names are the
    /// printed card colours used at the counter.
    pub fn from_service_category(identifier: &str) -> Option<Self> {
        let normalized: String = identifier
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "food_handler" | "food" | "food_handlers" | "yellow" | "yellow_card" => {
                Some(Self::FoodHandler)
            }
            "non_food_handler" | "non_food" | "nonfood" | "non_food_handlers" | "green"
            | "green_card" => Some(Self::NonFoodHandler),
            "entertainment" | "entertainer" | "pink" | "pink_card" => Some(Self::Entertainment),
            _ => None,
        }
    }

    /// Whether a record with this service category counts towards `self`.
    pub fn matches(&self, service_category: &str) -> bool {
        match self {
            Self::All => true,
            category => Self::from_service_category(service_category) == Some(*category),
        }
    }

    /// Human label used in upstream prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FoodHandler => "food handler health cards",
            Self::NonFoodHandler => "non-food handler health cards",
            Self::Entertainment => "entertainment worker health cards",
            Self::All => "all health card categories",
        }
    }
}
