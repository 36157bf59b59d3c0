use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
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

str_enum!(ScanLabel {
    Normal => "Normal",
    Ischemic => "Ischemic",
    Hemorrhagic => "Hemorrhagic",
});

impl ScanLabel {
    pub const ALL: [ScanLabel; 3] = [Self::Normal, Self::Ischemic, Self::Hemorrhagic];

    /// Lenient parse for labels typed or echoed back by the server:
    /// trims, ignores case and a leading "Predicted:" prefix.
    pub fn parse_loose(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        let trimmed = trimmed
            .strip_prefix("Predicted:")
            .map(str::trim)
            .unwrap_or(trimmed);
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ModelError::InvalidEnum {
                field: "ScanLabel".into(),
                value: raw.into(),
            })
    }
}

str_enum!(PredictionStatus {
    Unset => "unset",
    Predicted => "predicted",
    Saved => "saved",
});

str_enum!(ScanStatus {
    Unset => "unset",
    Predicted => "predicted",
    Saved => "saved",
    Disputed => "disputed",
});

impl ScanStatus {
    /// Saved and Disputed are mutually exclusive terminal branches.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Saved | Self::Disputed)
    }
}

str_enum!(CorrectionStatus {
    Pending => "pending",
    Resolved => "resolved",
});

str_enum!(Sender {
    User => "user",
    Assistant => "assistant",
});

str_enum!(MessageKind {
    Question => "question",
    Reply => "reply",
    Summary => "summary",
    Answer => "answer",
    Sources => "sources",
    Error => "error",
});
