/// Static hazard that hurts and repels players on contact.
#[derive(Debug, Clone, Default)]
pub struct IceSpike;

impl IceSpike {
    pub const DAMAGE: f64 = 10.0;
    pub const KNOCKBACK: f64 = 60.0;
    /// A player hurt by a spike ignores spikes for this long.
    pub const IMMUNITY_MS: u64 = 500;
}
