//! Time-based property animations owned by a single mirror

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TweenHandle(u64);

/// Which mirror property a tween drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TweenProperty {
    Alpha,
    ChatAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    handle: TweenHandle,
    property: TweenProperty,
    from: f64,
    to: f64,
    duration_ms: f64,
    elapsed_ms: f64,
}

impl Tween {
    fn value(&self) -> f64 {
        if self.duration_ms <= 0.0 {
            return self.to;
        }
        let t = (self.elapsed_ms / self.duration_ms).min(1.0);
        self.from + (self.to - self.from) * t
    }

    fn is_finished(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }
}

/// One property value produced by [`Tweens::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweenStep {
    pub handle: TweenHandle,
    pub property: TweenProperty,
    pub value: f64,
    pub finished: bool,
}

/// In-flight tweens. At most one tween drives a property at a time.
#[derive(Debug, Clone, Default)]
pub struct Tweens {
    next_handle: u64,
    active: Vec<Tween>,
}

impl Tweens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts animating `property` from `from` to `to`, replacing any tween
    /// already driving it.
    pub fn start(
        &mut self,
        property: TweenProperty,
        from: f64,
        to: f64,
        duration_ms: f64,
    ) -> TweenHandle {
        self.active.retain(|tween| tween.property != property);

        self.next_handle += 1;
        let handle = TweenHandle(self.next_handle);
        self.active.push(Tween {
            handle,
            property,
            from,
            to,
            duration_ms: duration_ms.max(0.0),
            elapsed_ms: 0.0,
        });
        handle
    }

    /// Stops the tween behind `handle`. Handles of finished or replaced
    /// tweens are already invalid and cancel nothing.
    pub fn cancel(&mut self, handle: TweenHandle) -> bool {
        let before = self.active.len();
        self.active.retain(|tween| tween.handle != handle);
        self.active.len() != before
    }

    pub fn is_active(&self, handle: TweenHandle) -> bool {
        self.active.iter().any(|tween| tween.handle == handle)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Moves every tween forward and reports the new values. Finished tweens
    /// are reported once with their end value and then dropped.
    pub fn advance(&mut self, dt_ms: f64) -> Vec<TweenStep> {
        let mut steps = Vec::with_capacity(self.active.len());
        for tween in &mut self.active {
            tween.elapsed_ms += dt_ms;
            steps.push(TweenStep {
                handle: tween.handle,
                property: tween.property,
                value: tween.value(),
                finished: tween.is_finished(),
            });
        }
        self.active.retain(|tween| !tween.is_finished());
        steps
    }
}
