use std::fmt::{Debug, Display, Formatter};

use ordered_float::OrderedFloat;

#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd)]
#[derive(derive_more::From, derive_more::FromStr)]
#[from(f64, OrderedFloat<f64>)]
#[must_use]
pub struct Percent(pub OrderedFloat<f64>);

impl Percent {
    #[must_use]
    pub const fn to_proportion(self) -> f64 {
        0.01 * self.0.0
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Debug for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
