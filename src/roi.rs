//! Region-of-interest planning.
//!
//! Devices validate `Offset + Extent <= Max` on every single write, so moving
//! a window across the sensor has to pick which of the two features goes
//! first. The planner here is pure; `CameraHandle::set_roi` executes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CameraError, CameraResult};
use crate::property::Property;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn offset_property(&self) -> Property {
        match self {
            Axis::X => Property::OffsetX,
            Axis::Y => Property::OffsetY,
        }
    }

    pub fn extent_property(&self) -> Property {
        match self {
            Axis::X => Property::Width,
            Axis::Y => Property::Height,
        }
    }

    pub fn max_property(&self) -> Property {
        match self {
            Axis::X => Property::WidthMax,
            Axis::Y => Property::HeightMax,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Y => f.write_str("Y"),
        }
    }
}

/// Sensor window in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub offset_x: i64,
    pub offset_y: i64,
    pub width: i64,
    pub height: i64,
}

impl Roi {
    pub fn new(offset_x: i64, offset_y: i64, width: i64, height: i64) -> Self {
        Self {
            offset_x,
            offset_y,
            width,
            height,
        }
    }

    /// Full sensor
    pub fn full(max_x: i64, max_y: i64) -> Self {
        Self::new(0, 0, max_x, max_y)
    }

    /// Half-size window centred on the sensor
    pub fn centered(max_x: i64, max_y: i64) -> Self {
        Self::new(max_x / 4, max_y / 4, max_x / 2, max_y / 2)
    }

    /// (offset, extent) along `axis`
    pub fn along(&self, axis: Axis) -> (i64, i64) {
        match axis {
            Axis::X => (self.offset_x, self.width),
            Axis::Y => (self.offset_y, self.height),
        }
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.offset_x, self.offset_y
        )
    }
}

/// Parses `WxH`, `WxH+X+Y`
impl FromStr for Roi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid ROI '{}', expected WIDTHxHEIGHT[+X+Y]", s);

        let mut parts = s.trim().split('+');
        let size = parts.next().ok_or_else(invalid)?;
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(invalid)?;

        let number = |text: Option<&str>| -> Result<i64, String> {
            text.ok_or_else(invalid)?.trim().parse().map_err(|_| invalid())
        };

        let width = number(Some(width))?;
        let height = number(Some(height))?;
        let (offset_x, offset_y) = match (parts.next(), parts.next()) {
            (None, None) => (0, 0),
            (x, y) => (number(x)?, number(y)?),
        };

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(offset_x, offset_y, width, height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrder {
    OffsetFirst,
    ExtentFirst,
}

/// Ordered writes for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPlan {
    pub axis: Axis,
    pub offset: i64,
    pub extent: i64,
    pub order: WriteOrder,
}

impl AxisPlan {
    pub fn writes(&self) -> [(Property, i64); 2] {
        let offset = (self.axis.offset_property(), self.offset);
        let extent = (self.axis.extent_property(), self.extent);
        match self.order {
            WriteOrder::OffsetFirst => [offset, extent],
            WriteOrder::ExtentFirst => [extent, offset],
        }
    }
}

/// Validate one axis and choose its write order.
///
/// If the new offset does not fit next to the current extent, the extent is
/// written first. Otherwise the offset goes first.
pub fn plan_axis(
    axis: Axis,
    offset: i64,
    extent: i64,
    max: i64,
    current_extent: i64,
) -> CameraResult<AxisPlan> {
    if offset < 0 || extent <= 0 || offset > max || extent > max - offset {
        return Err(CameraError::InvalidRoi {
            axis,
            offset,
            extent,
            max,
        });
    }

    let order = if offset > max - current_extent {
        WriteOrder::ExtentFirst
    } else {
        WriteOrder::OffsetFirst
    };

    Ok(AxisPlan {
        axis,
        offset,
        extent,
        order,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiPlan {
    pub x: AxisPlan,
    pub y: AxisPlan,
}

impl RoiPlan {
    /// All four writes, X axis first
    pub fn writes(&self) -> Vec<(Property, i64)> {
        self.x.writes().into_iter().chain(self.y.writes()).collect()
    }
}

/// Plan both axes. Nothing is returned unless both axes are valid.
pub fn plan(roi: &Roi, max: (i64, i64), current_extent: (i64, i64)) -> CameraResult<RoiPlan> {
    let x = plan_axis(Axis::X, roi.offset_x, roi.width, max.0, current_extent.0)?;
    let y = plan_axis(Axis::Y, roi.offset_y, roi.height, max.1, current_extent.1)?;
    Ok(RoiPlan { x, y })
}
