//! Batch planner: orders instances into two interleaved rolling-update
//! waves.
//!
//! Instances are grouped by application. Single instances go to whichever
//! wave is shorter; the first two members of a multi-replica group are
//! split across the waves, alternating which wave gets the first member
//! from one group to the next. The waves are then interleaved, so EVEN
//! members land on even positions and ODD members on odd positions.

use std::collections::HashMap;

use tracing::debug;

/// Anything the planner can place: it only needs the application and the
/// server name.
pub trait BatchMember {
    fn app_name(&self) -> &str;
    fn server_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wave {
    Even,
    Odd,
}

/// Order `instances` for a two-wave rolling update.
///
/// The result is a permutation of the input. For an application with
/// exactly two replicas, the replicas end up at positions of different
/// parity.
pub fn plan_batches<T: BatchMember>(instances: Vec<T>) -> Vec<T> {
    let total = instances.len();
    let mut even: Vec<T> = Vec::with_capacity(total / 2 + 1);
    let mut odd: Vec<T> = Vec::with_capacity(total / 2 + 1);
    let mut toggle = false;

    for mut group in group_by_app(instances) {
        group.sort_by(|a, b| a.server_name().cmp(b.server_name()));

        if group.len() == 1 {
            let wave = if even.len() <= odd.len() {
                Wave::Even
            } else {
                Wave::Odd
            };
            for member in group {
                place(&mut even, &mut odd, wave, member);
            }
            continue;
        }

        let initial_toggle = toggle;
        toggle = !toggle;
        for (i, member) in group.into_iter().enumerate() {
            let wave = match i {
                0 if !initial_toggle => Wave::Even,
                0 => Wave::Odd,
                1 if !initial_toggle => Wave::Odd,
                1 => Wave::Even,
                _ if (i % 2 == 0) != initial_toggle => Wave::Odd,
                _ => Wave::Even,
            };
            place(&mut even, &mut odd, wave, member);
        }
    }

    interleave(even, odd)
}

/// Split a planned ordering into the members at even positions and the
/// members at odd positions.
pub fn split_waves<T>(ordered: Vec<T>) -> (Vec<T>, Vec<T>) {
    let mut first = Vec::with_capacity(ordered.len() / 2 + 1);
    let mut second = Vec::with_capacity(ordered.len() / 2);
    for (i, item) in ordered.into_iter().enumerate() {
        if i % 2 == 0 {
            first.push(item);
        } else {
            second.push(item);
        }
    }
    (first, second)
}

/// Groups in order of first appearance; members keep their input order.
fn group_by_app<T: BatchMember>(instances: Vec<T>) -> Vec<Vec<T>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();
    for instance in instances {
        let slot = match index.get(instance.app_name()) {
            Some(&slot) => slot,
            None => {
                index.insert(instance.app_name().to_string(), groups.len());
                groups.push(Vec::new());
                groups.len() - 1
            }
        };
        groups[slot].push(instance);
    }
    groups
}

fn place<T: BatchMember>(even: &mut Vec<T>, odd: &mut Vec<T>, wave: Wave, member: T) {
    debug!(
        app = member.app_name(),
        server = member.server_name(),
        wave = ?wave,
        "placed rollout target"
    );
    match wave {
        Wave::Even => even.push(member),
        Wave::Odd => odd.push(member),
    }
}

fn interleave<T>(even: Vec<T>, odd: Vec<T>) -> Vec<T> {
    let mut result = Vec::with_capacity(even.len() + odd.len());
    let mut even = even.into_iter();
    let mut odd = odd.into_iter();
    loop {
        match (even.next(), odd.next()) {
            (None, None) => break,
            (e, o) => result.extend(e.into_iter().chain(o)),
        }
    }
    result
}
