pub const DB_EPS: f32 = 1e-10;

pub fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(DB_EPS).log10()
}

pub fn frame_energy(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    s
}

pub fn frame_rms(x: &[f32]) -> f32 {
    (frame_energy(x) / (x.len().max(1) as f32)).sqrt()
}
