use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

/// Euler angles of the ZYX convention, in radians: `R = Rz(yaw)·Ry(pitch)·Rx(roll)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerZyx {
    /// Rotation about Z.
    pub yaw: f64,
    /// Rotation about Y.
    pub pitch: f64,
    /// Rotation about X.
    pub roll: f64,
}

impl EulerZyx {
    /// Create a new set of angles.
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// The angles as `[yaw, pitch, roll]`.
    pub fn to_array(&self) -> [f64; 3] {
        [self.yaw, self.pitch, self.roll]
    }

    /// The rotation matrix these angles describe.
    pub fn to_rotation(&self) -> [[f64; 3]; 3] {
        euler_zyx_to_rotation(self.yaw, self.pitch, self.roll)
    }
}

/// Decompose a rotation matrix into ZYX Euler angles.
///
/// At the singularity `|r20| = 1` the roll is fixed to zero and the yaw carries the
/// combined rotation about the vertical axis.
pub fn rotation_to_euler_zyx(r: &[[f64; 3]; 3]) -> EulerZyx {
    let r20 = r[2][0];

    if r20 <= -1.0 {
        // pitch = +pi/2, r11 = cos(yaw - roll) and r12 = sin(yaw - roll)
        EulerZyx {
            yaw: -(-r[1][2]).atan2(r[1][1]),
            pitch: FRAC_PI_2,
            roll: 0.0,
        }
    } else if r20 >= 1.0 {
        // pitch = -pi/2, r11 = cos(yaw + roll) and r12 = -sin(yaw + roll)
        EulerZyx {
            yaw: (-r[1][2]).atan2(r[1][1]),
            pitch: -FRAC_PI_2,
            roll: 0.0,
        }
    } else {
        EulerZyx {
            yaw: r[1][0].atan2(r[0][0]),
            pitch: (-r20).asin(),
            roll: r[2][1].atan2(r[2][2]),
        }
    }
}

/// Compose `Rz(yaw)·Ry(pitch)·Rx(roll)`.
pub fn euler_zyx_to_rotation(yaw: f64, pitch: f64, roll: f64) -> [[f64; 3]; 3] {
    let (sy, cy) = yaw.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sr, cr) = roll.sin_cos();

    [
        [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
        [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
        [-sp, cp * sr, cp * cr],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn assert_mat_eq(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], eps: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a[i][j], b[i][j], epsilon = eps);
            }
        }
    }

    fn wrap(angle: f64) -> f64 {
        (angle + PI).rem_euclid(2.0 * PI) - PI
    }

    #[test]
    fn identity_has_zero_angles() {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert_eq!(rotation_to_euler_zyx(&identity), EulerZyx::default());
        assert_eq!(euler_zyx_to_rotation(0.0, 0.0, 0.0), identity);
    }

    #[test]
    fn elementary_rotations() {
        let a: f64 = 0.4;
        let (s, c) = a.sin_cos();
        assert_mat_eq(
            &euler_zyx_to_rotation(a, 0.0, 0.0),
            &[[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            1e-15,
        );
        assert_mat_eq(
            &euler_zyx_to_rotation(0.0, a, 0.0),
            &[[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
            1e-15,
        );
        assert_mat_eq(
            &euler_zyx_to_rotation(0.0, 0.0, a),
            &[[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]],
            1e-15,
        );
    }

    #[test]
    fn composition_order_is_z_then_y_then_x() {
        let (yaw, pitch, roll) = (0.3, -0.5, 1.1);
        let rz = euler_zyx_to_rotation(yaw, 0.0, 0.0);
        let ry = euler_zyx_to_rotation(0.0, pitch, 0.0);
        let rx = euler_zyx_to_rotation(0.0, 0.0, roll);

        let mul = |a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]| {
            let mut out = [[0.0; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
                }
            }
            out
        };

        let expected = mul(&mul(&rz, &ry), &rx);
        assert_mat_eq(&euler_zyx_to_rotation(yaw, pitch, roll), &expected, 1e-15);
    }

    #[test]
    fn angles_round_trip_away_from_poles() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let yaw = rng.random_range(-PI + 1e-6..PI - 1e-6);
            let pitch = rng.random_range(-FRAC_PI_2 + 1e-3..FRAC_PI_2 - 1e-3);
            let roll = rng.random_range(-PI + 1e-6..PI - 1e-6);

            let angles = rotation_to_euler_zyx(&euler_zyx_to_rotation(yaw, pitch, roll));
            assert_relative_eq!(angles.yaw, yaw, epsilon = 1e-9);
            assert_relative_eq!(angles.pitch, pitch, epsilon = 1e-9);
            assert_relative_eq!(angles.roll, roll, epsilon = 1e-9);
        }
    }

    #[test]
    fn rotation_round_trip() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let r = euler_zyx_to_rotation(
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
            );
            let back = rotation_to_euler_zyx(&r).to_rotation();
            assert_mat_eq(&back, &r, 1e-7);
        }
    }

    #[test]
    fn gimbal_lock_positive_pitch() {
        let (yaw, roll) = (0.7, 0.2);
        let r = euler_zyx_to_rotation(yaw, FRAC_PI_2, roll);
        assert_eq!(r[2][0], -1.0);

        let angles = rotation_to_euler_zyx(&r);
        assert_eq!(angles.pitch, FRAC_PI_2);
        assert_eq!(angles.roll, 0.0);
        assert_eq!(angles.yaw, -(-r[1][2]).atan2(r[1][1]));
        assert_relative_eq!(angles.yaw, yaw - roll, epsilon = 1e-12);

        // roll is absorbed into yaw, the matrix itself is preserved
        assert_mat_eq(&angles.to_rotation(), &r, 1e-12);
    }

    #[test]
    fn gimbal_lock_negative_pitch() {
        let (yaw, roll) = (0.7, 0.2);
        let r = euler_zyx_to_rotation(yaw, -FRAC_PI_2, roll);
        assert_eq!(r[2][0], 1.0);

        let angles = rotation_to_euler_zyx(&r);
        assert_eq!(angles.pitch, -FRAC_PI_2);
        assert_eq!(angles.roll, 0.0);
        assert_eq!(angles.yaw, (-r[1][2]).atan2(r[1][1]));
        assert_relative_eq!(angles.yaw, yaw + roll, epsilon = 1e-12);

        assert_mat_eq(&angles.to_rotation(), &r, 1e-12);
    }

    #[test]
    fn gimbal_lock_round_trips_pitch_and_yaw() {
        for pitch in [FRAC_PI_2, -FRAC_PI_2] {
            for yaw in [-2.5, -0.3, 0.0, 1.2, 3.0] {
                let angles = rotation_to_euler_zyx(&euler_zyx_to_rotation(yaw, pitch, 0.0));
                assert_eq!(angles.pitch, pitch);
                assert_eq!(angles.roll, 0.0);
                assert_relative_eq!(wrap(angles.yaw - yaw), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn out_of_range_r20_is_clamped_to_pole() {
        let mut r = euler_zyx_to_rotation(0.5, FRAC_PI_2, 0.0);
        r[2][0] = -1.0 - 1e-12;
        let angles = rotation_to_euler_zyx(&r);
        assert_eq!(angles.pitch, FRAC_PI_2);
        assert!(angles.yaw.is_finite());
    }

    #[test]
    fn to_array_order() {
        assert_eq!(EulerZyx::new(1.0, 2.0, 3.0).to_array(), [1.0, 2.0, 3.0]);
    }
}
