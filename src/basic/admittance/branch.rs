use nalgebra::Matrix4;

use super::AdmittanceType;
use crate::basic::error::{Result, ScError};
use crate::basic::homopolar::{COEF_XO_XD, HomopolarModel, HomopolarParameters};
use crate::basic::network::{Branch, BranchKind};

/// 4x4 admittance block of a branch relating `(V1r, V1i, V2r, V2i)` to `(I1r, I1i, I2r, I2i)`.
///
/// Direct sequence for every mode except `AdmTheveninHomopolar`, where lines use the
/// zero-sequence pi model and transformers the homopolar matrix.
pub fn branch_admittance_block(
    branch: &Branch,
    admittance_type: AdmittanceType,
    homopolar: &HomopolarParameters,
) -> Result<Matrix4<f64>> {
    let pi = &branch.pi;
    if pi.x == 0.0 {
        return Err(ScError::ZeroReactance(branch.id.clone()));
    }
    if pi.z() == 0.0 {
        return Err(ScError::ZeroImpedance(branch.id.clone()));
    }

    let rho = pi.rho;
    let (sin_a, cos_a) = pi.alpha.to_radians().sin_cos();

    if admittance_type != AdmittanceType::AdmTheveninHomopolar {
        let z_inv_square = 1.0 / (pi.z() * pi.z());
        let g12 = rho * z_inv_square * (pi.r * cos_a + pi.x * sin_a);
        let b12 = -rho * z_inv_square * (pi.x * cos_a + pi.r * sin_a);
        let g1g12sum = rho * rho * (pi.g1 + pi.r * z_inv_square);
        let b1b12sum = rho * rho * (pi.b1 - pi.x * z_inv_square);
        let g21 = g12;
        let b21 = rho * z_inv_square * (pi.r * sin_a - pi.x * cos_a);
        let g2g21sum = pi.r * z_inv_square + pi.g2;
        let b2b21sum = -pi.x * z_inv_square + pi.b2;
        return Ok(pi_block(
            (g12, b12),
            (g1g12sum, b1b12sum),
            (g21, b21),
            (g2g21sum, b2b21sum),
        ));
    }

    let model = HomopolarModel::build(branch, homopolar);
    match branch.kind {
        BranchKind::Line => {
            let zo_inv = model.zo_inv_square();
            let (ro, xo) = (model.ro, model.xo);
            let g12 = rho * zo_inv * (ro * cos_a + xo * sin_a);
            let b12 = -rho * zo_inv * (xo * cos_a + ro * sin_a);
            let g1g12sum = rho * rho * (model.gom + ro * zo_inv);
            let b1b12sum = rho * rho * (model.bom - xo * zo_inv);
            let g21 = rho * zo_inv * (ro * cos_a + xo * sin_a);
            let b21 = rho * zo_inv * (ro * sin_a - xo * cos_a);
            let g2g21sum = ro * zo_inv + pi.g2 * COEF_XO_XD;
            let b2b21sum = -xo * zo_inv + pi.b2 * COEF_XO_XD;
            Ok(pi_block(
                (g12, b12),
                (g1g12sum, b1b12sum),
                (g21, b21),
                (g2g21sum, b2b21sum),
            ))
        }
        BranchKind::Transfo2 | BranchKind::Transfo3Leg1 | BranchKind::Transfo3Leg2 | BranchKind::Transfo3Leg3 => {
            Ok(model.admittance_matrix())
        }
    }
}

fn pi_block(
    (g12, b12): (f64, f64),
    (g1g12sum, b1b12sum): (f64, f64),
    (g21, b21): (f64, f64),
    (g2g21sum, b2b21sum): (f64, f64),
) -> Matrix4<f64> {
    Matrix4::new(
        g1g12sum, -b1b12sum, -g12, b12, //
        b1b12sum, g1g12sum, -b12, -g12, //
        -g21, b21, g2g21sum, -b2b21sum, //
        -b21, -g21, b2b21sum, g2g21sum,
    )
}
