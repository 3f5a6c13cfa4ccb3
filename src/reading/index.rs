use serde::Serialize;

/// pm2.5 breakpoints: (concentration low, concentration high, index low, index high)
const BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.0, 35.4, 50.0, 100.0),
    (35.4, 55.4, 100.0, 150.0),
    (55.4, 150.4, 150.0, 200.0),
    (150.4, 250.4, 200.0, 300.0),
    (250.4, 500.4, 300.0, 500.0),
];

/// Composite air-quality index for a pm2.5 concentration (µg/m³).
///
/// Piecewise-linear over [`BREAKPOINTS`], upper bounds inclusive, truncated
/// toward zero. The top segment keeps its slope past 500.4 instead of capping.
pub fn composite_index(pm25: f64) -> u32 {
    let c = if pm25.is_nan() { 0.0 } else { pm25.max(0.0) };

    let (c_lo, c_hi, i_lo, i_hi) = BREAKPOINTS
        .iter()
        .copied()
        .find(|&(_, c_hi, _, _)| c <= c_hi)
        .unwrap_or(BREAKPOINTS[BREAKPOINTS.len() - 1]);

    // (c - c_lo) / (c_hi - c_lo) is exactly 1.0 at a breakpoint
    let index = i_lo + (i_hi - i_lo) * (c - c_lo) / (c_hi - c_lo);
    index as u32
}

/// Five-tier display category, derived from raw pm2.5 independently of the index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AirQualityCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    Hazardous,
}

impl AirQualityCategory {
    pub fn from_pm25(pm25: f64) -> Self {
        if pm25 <= 12.0 {
            Self::Good
        } else if pm25 <= 35.0 {
            Self::Moderate
        } else if pm25 <= 55.0 {
            Self::UnhealthyForSensitiveGroups
        } else if pm25 <= 150.0 {
            Self::Unhealthy
        } else {
            Self::Hazardous
        }
    }

    /// Tier number, 1 (Good) to 5 (Hazardous)
    pub fn index(self) -> u8 {
        match self {
            Self::Good => 1,
            Self::Moderate => 2,
            Self::UnhealthyForSensitiveGroups => 3,
            Self::Unhealthy => 4,
            Self::Hazardous => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Good => "#00E400",
            Self::Moderate => "#FFFF00",
            Self::UnhealthyForSensitiveGroups => "#FF8C00",
            Self::Unhealthy => "#FF0000",
            Self::Hazardous => "#8F3F97",
        }
    }

    pub fn info(self) -> CategoryInfo {
        CategoryInfo {
            index: self.index(),
            category: self.label(),
            color: self.color(),
        }
    }
}

/// Serializable view of a category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub index: u8,
    pub category: &'static str,
    pub color: &'static str,
}
