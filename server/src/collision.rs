//! Contact detection between entities and their declared targets
//!
//! Detection is a single ordered sweep over every pair; the response belongs to
//! the entity reacting (see [`Entity::process_targets_collision`]).

use crate::entity::{Entity, TickContext};

/// True when `a` should react to touching `b`: `b`'s kind is one of `a`'s
/// targets and `b` does not forbid `a`'s kind.
pub fn can_react(a: &Entity, b: &Entity) -> bool {
    a.targets().contains(&b.kind()) && !b.kind().forbids(a.kind())
}

/// Resolves every contact of the tick in insertion order.
///
/// Pairs are visited as `(i, j)` with `i < j`. For a pair, the earlier entity
/// reacts first and the later one reacts second if both are still active. An
/// entity removed by a response takes no further part in the pass.
///
/// Returns the number of responses dispatched.
pub fn resolve_collisions(entities: &mut [Entity], ctx: &mut TickContext) -> usize {
    let mut dispatched = 0;

    for i in 0..entities.len() {
        let (head, tail) = entities.split_at_mut(i + 1);
        let a = &mut head[i];

        for b in tail.iter_mut() {
            if !a.is_active() {
                break;
            }
            if !b.is_active() {
                continue;
            }

            let a_reacts = can_react(a, b);
            let b_reacts = can_react(b, a);
            if !(a_reacts || b_reacts) || !a.shape.intersects(&b.shape) {
                continue;
            }

            if a_reacts {
                a.process_targets_collision(b, ctx);
                dispatched += 1;
            }
            if b_reacts && a.is_active() && b.is_active() {
                b.process_targets_collision(a, ctx);
                dispatched += 1;
            }
        }
    }

    dispatched
}
