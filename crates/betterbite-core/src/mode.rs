use serde::{Deserialize, Serialize};

/// Capture mode selected on the camera view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Nutrition,
    #[default]
    Scan,
    Compare,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Nutrition => "nutrition",
            ScanMode::Scan => "scan",
            ScanMode::Compare => "compare",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ScanMode::Nutrition => "Nutrition",
            ScanMode::Scan => "Label Scan",
            ScanMode::Compare => "Compare",
        }
    }

    /// Maximum number of shots collected before an analysis is submitted
    pub fn max_shots(&self) -> usize {
        match self {
            ScanMode::Nutrition | ScanMode::Scan => 1,
            ScanMode::Compare => 3,
        }
    }

    pub fn is_single_shot(&self) -> bool {
        self.max_shots() == 1
    }

    /// Cycle to the next mode in display order
    pub fn next(&self) -> Self {
        match self {
            ScanMode::Nutrition => ScanMode::Scan,
            ScanMode::Scan => ScanMode::Compare,
            ScanMode::Compare => ScanMode::Nutrition,
        }
    }
}
