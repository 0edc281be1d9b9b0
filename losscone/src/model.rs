//! Interface to the loss-cone forward model.
//!
//! The fitter only needs predicted normalized flux for a grid of energies and
//! pitch angles. Any closure with that signature is a model; [`SharpLossCone`]
//! is a step-edged reference model used by the command-line tool.

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Forward model mapping (energies, pitch angles, ΔU, B_s/B_m) to predicted
/// normalized flux.
pub trait LossConeModel {
    /// Predicted flux with the same shape as `pitch_angles`.
    ///
    /// `energies[r]` is the energy (eV) of row `r` of `pitch_angles` (degrees).
    fn synth(
        &self,
        energies: ArrayView1<'_, f64>,
        pitch_angles: ArrayView2<'_, f64>,
        delta_u: f64,
        bs_over_bm: f64,
    ) -> Array2<f64>;
}

impl<F> LossConeModel for F
where
    F: Fn(ArrayView1<'_, f64>, ArrayView2<'_, f64>, f64, f64) -> Array2<f64>,
{
    fn synth(
        &self,
        energies: ArrayView1<'_, f64>,
        pitch_angles: ArrayView2<'_, f64>,
        delta_u: f64,
        bs_over_bm: f64,
    ) -> Array2<f64> {
        self(energies, pitch_angles, delta_u, bs_over_bm)
    }
}

/// Adiabatic loss cone with a sharp edge.
///
/// Electrons of energy E reflected by a surface at potential ΔU below a field
/// ratio B_s/B_m are lost when their pitch angle exceeds 180° − α_c, where
/// sin²α_c = (B_s/B_m)(1 + ΔU/E). Flux is 1 outside the loss cone and 0
/// inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharpLossCone;

impl SharpLossCone {
    /// Loss-cone half angle in degrees, or NaN for a non-physical energy.
    pub fn cone_angle_deg(energy: f64, delta_u: f64, bs_over_bm: f64) -> f64 {
        let sin_sq = bs_over_bm * (1.0 + delta_u / energy);
        if !sin_sq.is_finite() {
            return f64::NAN;
        }
        sin_sq.clamp(0.0, 1.0).sqrt().asin().to_degrees()
    }
}

impl LossConeModel for SharpLossCone {
    fn synth(
        &self,
        energies: ArrayView1<'_, f64>,
        pitch_angles: ArrayView2<'_, f64>,
        delta_u: f64,
        bs_over_bm: f64,
    ) -> Array2<f64> {
        Array2::from_shape_fn(pitch_angles.dim(), |(row, channel)| {
            let energy = energies.get(row).copied().unwrap_or(f64::NAN);
            let cone = Self::cone_angle_deg(energy, delta_u, bs_over_bm);
            let pitch = pitch_angles[[row, channel]];
            if cone.is_nan() || pitch.is_nan() {
                f64::NAN
            } else if pitch >= 180.0 - cone {
                0.0
            } else {
                1.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_cone_angle() {
        // B_s/B_m = 0.5 and no potential: sin²α = 0.5, α = 45°
        assert_abs_diff_eq!(SharpLossCone::cone_angle_deg(100.0, 0.0, 0.5), 45.0, epsilon = 1e-9);
        // Strong repelling potential closes the cone
        assert_eq!(SharpLossCone::cone_angle_deg(100.0, -200.0, 0.5), 0.0);
        // Attracting potential saturates at 90°
        assert_abs_diff_eq!(SharpLossCone::cone_angle_deg(100.0, 500.0, 0.5), 90.0, epsilon = 1e-9);
        // Zero energy with a repelling potential is not physical
        assert!(SharpLossCone::cone_angle_deg(0.0, -10.0, 0.5).is_nan());
    }

    #[test]
    fn test_sharp_model_masks_loss_cone() {
        let energies = Array1::from(vec![100.0]);
        let pitch = array![[10.0, 120.0, 140.0, 170.0]];
        let flux = SharpLossCone.synth(energies.view(), pitch.view(), 0.0, 0.5);
        assert_eq!(flux, array![[1.0, 1.0, 0.0, 0.0]]);
    }

    fn constant(_: ArrayView1<'_, f64>, p: ArrayView2<'_, f64>, du: f64, _: f64) -> Array2<f64> {
        Array2::from_elem(p.dim(), du)
    }

    #[test]
    fn test_function_is_a_model() {
        let pitch = Array2::<f64>::zeros((2, 3));
        let energies = Array1::from(vec![1.0, 2.0]);
        let flux = constant.synth(energies.view(), pitch.view(), 4.0, 0.3);
        assert_eq!(flux.dim(), (2, 3));
        assert!(flux.iter().all(|&v| v == 4.0));
    }
}
