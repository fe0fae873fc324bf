use derive_more::Display;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use super::network::{Branch, BranchKind, GroundingImpedance};

/// Ratio between direct and zero-sequence impedances used when no zero-sequence data is given.
pub const COEF_XO_XD: f64 = 0.33;

/// Admittance placed on the diagonal where no zero-sequence current can flow.
///
/// A small finite value keeps the global matrix non-singular.
pub const INFINITE_IMPEDANCE_ADMITTANCE_VALUE: f64 = 1e-6;

/// Winding connection of a transformer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum LegConnectionType {
    Y,
    YGrounded,
    Delta,
}

/// How a zero magnetizing admittance (`gom = bom = 0`) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingMagnetizing {
    /// The magnetizing impedance is taken as zero.
    #[default]
    ZeroImpedance,
    /// The magnetizing impedance is taken as infinite, the free-flux formulas apply.
    FreeFluxes,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomopolarParameters {
    pub missing_magnetizing: MissingMagnetizing,
}

/// Zero-sequence model of a branch.
///
/// Transformer model, values per unit on Sbase and the nominal voltage of side B:
///
/// ```text
///     Ia       Yg    A'  rho                 B'     Yg        Ib
///  A-->--3*Zga--+    +--(())--+--Zoa--+--Zob--+     +--3*Zgb--<--B
///               Y +                   |           + Y
///                   + D              Zom        + D
///                   |                 |         |
///                 /////             /////     /////
/// ```
/// `Zoa = Zob = Zo / 2`; A' and B' are wired to ground, open or delta depending on the
/// connection type of each side. Free fluxes means `Zom` is infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct HomopolarModel {
    pub kind: BranchKind,
    pub rho: f64,
    /// Phase shift (degrees).
    pub alpha: f64,
    pub ro: f64,
    pub xo: f64,
    pub gom: f64,
    pub bom: f64,
    pub grounding: GroundingImpedance,
    pub leg1_connection: LegConnectionType,
    pub leg2_connection: LegConnectionType,
    pub free_fluxes: bool,
}

impl HomopolarModel {
    /// Builds the model of `branch`, from its zero-sequence data when present.
    pub fn build(branch: &Branch, params: &HomopolarParameters) -> Self {
        let pi = &branch.pi;
        let mut model = Self {
            kind: branch.kind,
            rho: pi.rho,
            alpha: pi.alpha,
            ro: pi.r / COEF_XO_XD,
            xo: pi.x / COEF_XO_XD,
            gom: pi.g1 * COEF_XO_XD,
            bom: pi.b1 * COEF_XO_XD,
            grounding: GroundingImpedance::default(),
            leg1_connection: LegConnectionType::YGrounded,
            leg2_connection: LegConnectionType::YGrounded,
            free_fluxes: false,
        };

        if let Some(zs) = &branch.zero_sequence {
            model.ro = pi.r * zs.coeff_ro;
            model.xo = pi.x * zs.coeff_xo;
            model.gom = pi.g1 / zs.coeff_ro;
            model.bom = pi.b1 / zs.coeff_xo;
            if branch.kind.is_transformer() {
                model.leg1_connection = zs.leg1_connection;
                model.leg2_connection = zs.leg2_connection;
                model.free_fluxes = zs.free_fluxes;
                model.grounding = zs.grounding;
            }
        }

        if params.missing_magnetizing == MissingMagnetizing::FreeFluxes
            && model.gom == 0.0
            && model.bom == 0.0
        {
            model.free_fluxes = true;
        }
        model
    }

    /// `1 / (ro² + xo²)`, zero when the zero-sequence impedance is zero.
    pub fn zo_inv_square(&self) -> f64 {
        if self.ro != 0.0 || self.xo != 0.0 {
            1.0 / (self.ro * self.ro + self.xo * self.xo)
        } else {
            0.0
        }
    }

    /// Zero-sequence admittance matrix relating `(V1r, V1i, V2r, V2i)` to `(I1r, I1i, I2r, I2i)`.
    pub fn admittance_matrix(&self) -> Matrix4<f64> {
        use LegConnectionType::*;

        let inf = INFINITE_IMPEDANCE_ADMITTANCE_VALUE;
        let rho = self.rho;
        let rho2 = rho * rho;
        let (sin_a, cos_a) = self.alpha.to_radians().sin_cos();
        let (sin_2a, cos_2a) = (2.0 * self.alpha).to_radians().sin_cos();
        let GroundingImpedance { rga, xga, rgb, xgb } = self.grounding;
        let (gom, bom) = (self.gom, self.bom);

        let (rm, xm) = if gom != 0.0 || bom != 0.0 {
            let den = gom * gom + bom * bom;
            (gom / den, -bom / den)
        } else {
            (0.0, 0.0)
        };

        let (roa, xoa) = (self.ro / 2.0, self.xo / 2.0);
        let (rob, xob) = (self.ro / 2.0, self.xo / 2.0);

        let mut mo = Matrix4::zeros();
        match (self.leg1_connection, self.leg2_connection, self.free_fluxes) {
            (Y, Y, _) | (Y, Delta, _) | (Delta, Y, _) | (Delta, Delta, _) | (YGrounded, Y, true) | (Y, YGrounded, true) => {
                mo.fill_diagonal(inf);
            }
            (YGrounded, Y, false) => {
                let req = 3.0 * rga + ((self.ro + rm) * cos_2a - (self.xo + xm) * sin_2a) / rho2;
                let xeq = 3.0 * xga + ((self.xo + xm) * cos_2a + (self.ro + rm) * sin_2a) / rho2;
                set_side_block(&mut mo, 0, req, xeq);
                mo[(2, 2)] = inf;
                mo[(3, 3)] = inf;
            }
            (Y, YGrounded, false) => {
                let req = 3.0 * rgb + self.ro + rm;
                let xeq = 3.0 * xgb + self.xo + xm;
                set_side_block(&mut mo, 2, req, xeq);
                mo[(0, 0)] = inf;
                mo[(1, 1)] = inf;
            }
            (YGrounded, Delta, free_fluxes) => {
                let (rtmp, xtmp) = if free_fluxes {
                    (roa + rob, xoa + xob)
                } else {
                    let den_b = rob * rob + xob * xob;
                    let gomgob = gom + rob / den_b;
                    let bombob = bom - xob / den_b;
                    let den = gomgob * gomgob + bombob * bombob;
                    (roa + gomgob / den, xoa - bombob / den)
                };
                let req = 3.0 * rga + (rtmp * cos_2a - xtmp * sin_2a) / rho2;
                let xeq = 3.0 * xga + (xtmp * cos_2a + rtmp * sin_2a) / rho2;
                set_side_block(&mut mo, 0, req, xeq);
                mo[(2, 2)] = inf;
                mo[(3, 3)] = inf;
            }
            (Delta, YGrounded, free_fluxes) => {
                let (req, xeq) = if free_fluxes {
                    (3.0 * rgb + rob + roa, 3.0 * xgb + xob + xoa)
                } else {
                    let den_a = roa * roa + xoa * xoa;
                    let gomgoa = gom + roa / den_a;
                    let bomboa = bom - xoa / den_a;
                    let den = gomgoa * gomgoa + bomboa * bomboa;
                    (3.0 * rgb + rob + gomgoa / den, 3.0 * xgb + xob - bomboa / den)
                };
                set_side_block(&mut mo, 2, req, xeq);
                mo[(0, 0)] = inf;
                mo[(1, 1)] = inf;
            }
            (YGrounded, YGrounded, false) => {
                let rc = (cos_2a * (rm + roa) + sin_2a * (xm + xoa)) / rho2 + 3.0 * rga;
                let xc = (cos_2a * (xm + xoa) - sin_2a * (rm + roa)) / rho2 + 3.0 * xga;
                let rd = rm + rob + 3.0 * rgb;
                let xd = xm + xob + 3.0 * xgb;
                let re = (rm * cos_a + xm * sin_a) / rho;
                let xe = (xm * cos_a - rm * sin_a) / rho;

                // inverse of the determinant of the 2x2 complex impedance matrix
                let r2 = rc * rd - xc * xd - re * re + xe * xe;
                let x2 = rc * xd + xc * rd - 2.0 * re * xe;
                let g2 = r2 / (r2 * r2 + x2 * x2);
                let b2 = -x2 / (r2 * r2 + x2 * x2);

                let y11 = (g2 * rd - b2 * xd, b2 * rd + g2 * xd);
                let y12 = (-g2 * re + b2 * xe, -b2 * re - g2 * xe);
                let y22 = (g2 * rc - b2 * xc, b2 * rc + g2 * xc);
                set_coupled_blocks(&mut mo, y11, y12, y22);
            }
            (YGrounded, YGrounded, true) => {
                let rc = (cos_2a * (rob + roa + 3.0 * rgb) + sin_2a * (xoa + xob + 3.0 * xgb)) / rho2 + 3.0 * rga;
                let xc = (cos_2a * (xob + xoa + 3.0 * xgb) - sin_2a * (rob + roa + 3.0 * rgb)) / rho2 + 3.0 * xga;
                let gc = rc / (rc * rc + xc * xc);
                let bc = -xc / (rc * rc + xc * xc);

                let y11 = (gc, bc);
                let y12 = (-(gc * cos_a + bc * sin_a) / rho, -(bc * cos_a - gc * sin_a) / rho);
                let y22 = ((gc * cos_2a + bc * sin_2a) / rho2, (bc * cos_2a - gc * sin_2a) / rho2);
                set_coupled_blocks(&mut mo, y11, y12, y22);
            }
        }
        mo
    }
}

/// Writes the admittance `1 / (req + j*xeq)` as a 2x2 block at `(start, start)`.
fn set_side_block(mo: &mut Matrix4<f64>, start: usize, req: f64, xeq: f64) {
    let den = req * req + xeq * xeq;
    let g = req / den;
    let b = -xeq / den;
    set_block(mo, start, start, (g, b));
}

fn set_block(mo: &mut Matrix4<f64>, row: usize, col: usize, (g, b): (f64, f64)) {
    mo[(row, col)] = g;
    mo[(row, col + 1)] = -b;
    mo[(row + 1, col)] = b;
    mo[(row + 1, col + 1)] = g;
}

fn set_coupled_blocks(mo: &mut Matrix4<f64>, y11: (f64, f64), y12: (f64, f64), y22: (f64, f64)) {
    set_block(mo, 0, 0, y11);
    set_block(mo, 2, 2, y22);
    set_block(mo, 0, 2, y12);
    set_block(mo, 2, 0, y12);
}
