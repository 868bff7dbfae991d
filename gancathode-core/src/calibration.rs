//! Fixed calibration formulas
//!
//! Gauge voltages to pressures and photocurrent to quantum efficiency.
//! Pure functions, no I/O.

/// `h * c / e` in nm·V
pub const HC_OVER_E_NM_V: f64 = 1239.841_98;

/// EXT gauge pressure in Pa: `10 ^ (v - 10)`
pub fn ext_pressure(volts: f64) -> f64 {
    10f64.powf(volts - 10.0)
}

/// SIP (ion pump) pressure in Pa: `5e-7 * 10 ^ (v / 2)`
pub fn sip_pressure(volts: f64) -> f64 {
    5e-7 * 10f64.powf(volts / 2.0)
}

/// Quantum efficiency in percent
///
/// Returns `None` when the laser power or wavelength is not positive.
pub fn quantum_efficiency(
    photocurrent_a: f64,
    laser_power_mw: f64,
    wavelength_nm: f64,
) -> Option<f64> {
    if laser_power_mw <= 0.0 || wavelength_nm <= 0.0 {
        return None;
    }

    let power_w = laser_power_mw * 1e-3;
    Some(100.0 * HC_OVER_E_NM_V * photocurrent_a / (wavelength_nm * power_w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        ((a - b) / b).abs() < 1e-9
    }

    #[test]
    fn test_ext_pressure() {
        assert!(close(ext_pressure(10.0), 1.0));
        assert!(close(ext_pressure(3.0), 1e-7));
    }

    #[test]
    fn test_sip_pressure() {
        assert!(close(sip_pressure(0.0), 5e-7));
        assert!(close(sip_pressure(2.0), 5e-6));
    }

    #[test]
    fn test_quantum_efficiency() {
        // 1 mW at 1239.84198 nm carries 1 mA per 100 % QE
        let qe = quantum_efficiency(1e-3, 1.0, HC_OVER_E_NM_V).unwrap();
        assert!(close(qe, 100.0));

        let qe = quantum_efficiency(1e-6, 1.0, 405.0).unwrap();
        assert!(close(qe, 0.306_133_822_222));
    }

    #[test]
    fn test_quantum_efficiency_without_light() {
        assert_eq!(quantum_efficiency(1e-6, 0.0, 405.0), None);
        assert_eq!(quantum_efficiency(1e-6, 1.0, 0.0), None);
    }
}
