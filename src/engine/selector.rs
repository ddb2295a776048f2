use std::collections::BTreeSet;

use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{GeoPoint, haversine_km};

/// Anything the selector can pick: a rider or a pharmacy.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: Uuid,
    pub location: Option<GeoPoint>,
    /// Remaining slots; `None` when the candidate has no capacity model.
    pub spare_capacity: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub id: Uuid,
    pub distance_km: f64,
}

/// Nearest eligible candidate to `target`, ties broken by id.
///
/// Candidates without a usable location, without spare capacity, or listed in
/// `excluded` are skipped. An empty result is `Ok(None)`; only an invalid
/// `target` is an error.
pub fn select_nearest(
    target: &GeoPoint,
    candidates: &[Candidate],
    excluded: &BTreeSet<Uuid>,
) -> Result<Option<Selection>, AppError> {
    target.validate()?;

    let mut best: Option<Selection> = None;

    for candidate in candidates {
        if excluded.contains(&candidate.id) || candidate.spare_capacity == Some(0) {
            continue;
        }
        let Some(location) = candidate.location else {
            continue;
        };

        let distance_km = match haversine_km(&location, target) {
            Ok(distance) => distance,
            Err(err) => {
                warn!(
                    candidate_id = %candidate.id,
                    error = %err,
                    "skipping candidate with bad location"
                );
                continue;
            }
        };

        let closer = match &best {
            None => true,
            Some(current) => distance_km
                .total_cmp(&current.distance_km)
                .then_with(|| candidate.id.cmp(&current.id))
                .is_lt(),
        };

        if closer {
            best = Some(Selection {
                id: candidate.id,
                distance_km,
            });
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use super::{Candidate, select_nearest};
    use crate::geo::GeoPoint;

    const PICKUP: GeoPoint = GeoPoint {
        lat: 28.6139,
        lng: 77.2090,
    };

    fn candidate(seed: u128, lat: f64, lng: f64) -> Candidate {
        Candidate {
            id: Uuid::from_u128(seed),
            location: Some(GeoPoint { lat, lng }),
            spare_capacity: Some(1),
        }
    }

    #[test]
    fn picks_the_closest_candidate() {
        let near = candidate(2, 28.6140, 77.2091);
        let far = candidate(1, 28.70, 77.30);

        let picked = select_nearest(&PICKUP, &[far, near.clone()], &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, near.id);
    }

    #[test]
    fn equal_distance_is_broken_by_lowest_id() {
        let a = candidate(9, 28.62, 77.21);
        let b = candidate(3, 28.62, 77.21);

        let picked = select_nearest(&PICKUP, &[a, b], &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, Uuid::from_u128(3));
    }

    #[test]
    fn empty_pool_is_none_not_error() {
        assert_eq!(select_nearest(&PICKUP, &[], &BTreeSet::new()).unwrap(), None);
    }

    #[test]
    fn excluded_candidates_are_never_picked() {
        let only = candidate(1, 28.6140, 77.2091);
        let excluded: BTreeSet<Uuid> = [only.id].into_iter().collect();

        assert_eq!(select_nearest(&PICKUP, &[only], &excluded).unwrap(), None);
    }

    #[test]
    fn unknown_location_and_full_candidates_are_skipped() {
        let nowhere = Candidate {
            id: Uuid::from_u128(1),
            location: None,
            spare_capacity: None,
        };
        let full = Candidate {
            spare_capacity: Some(0),
            ..candidate(2, 28.6140, 77.2091)
        };
        let broken = Candidate {
            location: Some(GeoPoint {
                lat: f64::NAN,
                lng: 0.0,
            }),
            ..candidate(3, 0.0, 0.0)
        };
        let fine = candidate(4, 28.9, 77.5);

        let picked = select_nearest(&PICKUP, &[nowhere, full, broken, fine], &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, Uuid::from_u128(4));
    }

    #[test]
    fn invalid_target_is_an_error() {
        let target = GeoPoint {
            lat: 100.0,
            lng: 0.0,
        };
        assert!(select_nearest(&target, &[candidate(1, 0.0, 0.0)], &BTreeSet::new()).is_err());
    }
}
