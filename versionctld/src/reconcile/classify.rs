use shared::types::{Observation, Status};

/// Classify one service in one environment.
///
/// First matching rule wins:
/// 1. any unreachable observation: `Unreachable` if all are, else `Degraded`
/// 2. no observations: `Unknown`
/// 3. every observation reports the declared version (or, with nothing
///    declared, all report the same version): `Match`
/// 4. otherwise `Mismatch`
///
/// Versions compare as exact strings.
pub fn classify<'a>(
    declared: Option<&str>,
    observed: impl IntoIterator<Item = &'a Observation>,
) -> Status {
    let observed: Vec<&Observation> = observed.into_iter().collect();

    let unreachable = observed.iter().filter(|o| !o.is_reachable()).count();
    if unreachable > 0 {
        return if unreachable == observed.len() {
            Status::Unreachable
        } else {
            Status::Degraded
        };
    }

    if observed.is_empty() {
        return Status::Unknown;
    }

    let expected = match declared {
        Some(version) => Some(version),
        None => observed[0].version(),
    };

    let all_equal = expected.is_some() && observed.iter().all(|o| o.version() == expected);
    if all_equal {
        Status::Match
    } else {
        Status::Mismatch
    }
}
