//! Column-major 4x4 matrices to glTF node TRS.

use glam::{DMat4, DQuat, DVec3};

/// Translation, rotation (`[x, y, z, w]`) and scale, narrowed to `f32` for glTF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Trs {
    /// Little-endian bytes in instancing-buffer order: translation, scale, rotation.
    pub fn instance_bytes(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        let values = self
            .translation
            .iter()
            .chain(self.scale.iter())
            .chain(self.rotation.iter());
        for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

/// Split an affine transform into TRS. Returns `None` when the matrix has a
/// zero or non-finite determinant.
pub fn decompose(m: &[f64; 16]) -> Option<Trs> {
    let mat = DMat4::from_cols_array(m);
    let det = mat.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }

    let (scale, rotation, translation) = mat.to_scale_rotation_translation();
    Some(Trs {
        translation: translation.as_vec3().to_array(),
        rotation: rotation.as_quat().to_array(),
        scale: scale.as_vec3().to_array(),
    })
}

/// Inverse of [`decompose`], in double precision.
pub fn compose(trs: &Trs) -> [f64; 16] {
    let [x, y, z, w] = trs.rotation.map(f64::from);
    DMat4::from_scale_rotation_translation(
        DVec3::from_array(trs.scale.map(f64::from)),
        DQuat::from_xyzw(x, y, z, w).normalize(),
        DVec3::from_array(trs.translation.map(f64::from)),
    )
    .to_cols_array()
}
