use std::{
    fmt::{Debug, Display, Formatter},
    ops::{Div, Mul},
};

use crate::quantity::{Quantity, energy::KilowattHours, percent::Percent, rate::KilowattHourRate};

/// Malaysian ringgit.
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    pub const ONE_SEN: Self = Self(ordered_float::OrderedFloat(0.01));

    /// Round to whole sen, the way the printed bill does.
    pub fn round_to_sen(self) -> Self {
        Self::from((self.into_inner() * 100.0).round() / 100.0)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RM {:.2}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RM{:.4}", self.0)
    }
}

impl Mul<Percent> for Cost {
    type Output = Self;

    fn mul(self, rhs: Percent) -> Self::Output {
        self * rhs.to_proportion()
    }
}

impl Div<KilowattHours> for Cost {
    type Output = KilowattHourRate;

    fn div(self, rhs: KilowattHours) -> Self::Output {
        Quantity(self.0 / rhs.0)
    }
}
