//! Complex sample values.
//!
//! Every value flowing through a signal-flow graph is a [`Number`]: a complex
//! scalar with IEEE-754 binary64 components.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A complex sample value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Number {
    /// Real component.
    pub real: f64,
    /// Imaginary component.
    pub imag: f64,
}

impl Number {
    /// Zero sample.
    pub const ZERO: Number = Number { real: 0.0, imag: 0.0 };

    /// Create a number from both components.
    pub fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }

    /// Create a purely real number.
    pub fn real(real: f64) -> Self {
        Self { real, imag: 0.0 }
    }

    /// Whether the imaginary component is exactly zero.
    pub fn is_real(self) -> bool {
        self.imag == 0.0
    }

    /// Modulus of the complex value.
    pub fn modulus(self) -> f64 {
        self.real.hypot(self.imag)
    }

    /// Principal square root.
    pub fn sqrt(self) -> Number {
        let m = self.modulus();
        let re = ((m + self.real) * 0.5).sqrt();
        let im = ((m - self.real) * 0.5).sqrt();
        if self.imag.is_sign_negative() {
            Number::new(re, -im)
        } else {
            Number::new(re, im)
        }
    }

    /// Complex conjugate.
    pub fn conj(self) -> Number {
        Number::new(self.real, -self.imag)
    }

    /// Absolute value, as a real-valued number.
    pub fn abs(self) -> Number {
        Number::real(self.modulus())
    }
}

impl From<f64> for Number {
    fn from(real: f64) -> Self {
        Number::real(real)
    }
}

impl From<i32> for Number {
    fn from(real: i32) -> Self {
        Number::real(real as f64)
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        Number::new(self.real + rhs.real, self.imag + rhs.imag)
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        Number::new(self.real - rhs.real, self.imag - rhs.imag)
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        Number::new(
            self.real * rhs.real - self.imag * rhs.imag,
            self.real * rhs.imag + self.imag * rhs.real,
        )
    }
}

impl Div for Number {
    type Output = Number;

    fn div(self, rhs: Number) -> Number {
        let denom = rhs.real * rhs.real + rhs.imag * rhs.imag;
        Number::new(
            (self.real * rhs.real + self.imag * rhs.imag) / denom,
            (self.imag * rhs.real - self.real * rhs.imag) / denom,
        )
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        Number::new(-self.real, -self.imag)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.imag == 0.0 {
            write!(f, "{}", self.real)
        } else if self.imag.is_sign_negative() {
            write!(f, "{}-{}i", self.real, -self.imag)
        } else {
            write!(f, "{}+{}i", self.real, self.imag)
        }
    }
}
