/// Sensor channels the transformation engines operate on. Columns outside
/// this set ride through the pipeline untouched.
pub const REGISTERED_CHANNELS: [&str; 10] = [
    "Level1", "Level2", "Level3", "Level4", "Level5", "Level6", "Encoder3", "Ang1", "Ang2", "Ang3",
];

pub fn is_registered(name: &str) -> bool {
    REGISTERED_CHANNELS.contains(&name)
}
