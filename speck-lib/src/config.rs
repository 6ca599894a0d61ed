use serde::Serialize;
use strum_macros::Display;

/// Device configuration as last read from the Speck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeckConfig {
    pub id: String,
    pub protocol_version: u8,
    pub logging_interval_secs: u8,
    pub firmware_version: Option<u8>,
    pub hardware_version: Option<u8>,
    pub color_palette: Option<ColorPalette>,
    pub scale: Option<Scale>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum ColorPalette {
    /// Fixed palette of USB Specks; cannot be selected.
    Legacy,
    Default,
    Colorblind,
}

impl ColorPalette {
    pub fn id(&self) -> Option<u8> {
        match self {
            ColorPalette::Legacy => None,
            ColorPalette::Default => Some(0),
            ColorPalette::Colorblind => Some(1),
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(ColorPalette::Default),
            1 => Some(ColorPalette::Colorblind),
            _ => None,
        }
    }

    /// The other selectable palette.
    pub fn toggled(&self) -> Self {
        match self {
            ColorPalette::Default => ColorPalette::Colorblind,
            ColorPalette::Colorblind | ColorPalette::Legacy => ColorPalette::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Scale {
    #[strum(to_string = "Legacy Concentration")]
    LegacyConcentration,
    Count,
    Concentration,
}

impl Scale {
    pub fn id(&self) -> Option<u8> {
        match self {
            Scale::LegacyConcentration => None,
            Scale::Count => Some(0),
            Scale::Concentration => Some(1),
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Scale::Count),
            1 => Some(Scale::Concentration),
            _ => None,
        }
    }

    /// Unit abbreviation shown on the device display.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Scale::LegacyConcentration => "",
            Scale::Count => "c",
            Scale::Concentration => "w",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Scale::Count => Scale::Concentration,
            Scale::Concentration | Scale::LegacyConcentration => Scale::Count,
        }
    }
}
