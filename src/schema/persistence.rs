//! Persisted population format.

use serde::{Deserialize, Serialize};

use super::{Candidate, Pool};

/// One persisted candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDto {
    pub genes: Vec<f64>,
    pub score: f64,
}

/// A persisted population, in member order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationDto {
    pub generation: u64,
    pub candidates: Vec<CandidateDto>,
}

impl PopulationDto {
    pub fn from_pool(pool: &Pool<Vec<f64>, f64>) -> Self {
        Self {
            generation: pool.generation,
            candidates: pool
                .members
                .iter()
                .map(|c| CandidateDto {
                    genes: c.data.clone(),
                    score: c.score,
                })
                .collect(),
        }
    }

    /// Rebuild a pool verbatim. Size and gene checks are the caller's job.
    pub fn into_pool(self) -> Pool<Vec<f64>, f64> {
        let members = self
            .candidates
            .into_iter()
            .map(|c| Candidate::scored(c.genes, c.score))
            .collect();
        Pool::new(members, self.generation)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_conversion_preserves_order() {
        let pool = Pool::new(
            vec![
                Candidate::scored(vec![0.1, 0.2], 0.5),
                Candidate::scored(vec![0.3, 0.4], 0.7),
            ],
            12,
        );
        let dto = PopulationDto::from_pool(&pool);
        assert_eq!(dto.generation, 12);
        assert_eq!(dto.candidates[1].genes, vec![0.3, 0.4]);

        let back = dto.into_pool();
        assert_eq!(back.generation, 12);
        assert_eq!(back.members[0].data, vec![0.1, 0.2]);
        assert_eq!(back.members[1].score, 0.7);
        assert_eq!(back.stats.best, 0.7);
    }

    #[test]
    fn test_json_shape() {
        let dto = PopulationDto {
            generation: 3,
            candidates: vec![CandidateDto {
                genes: vec![1.5],
                score: 0.25,
            }],
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["generation"], 3);
        assert_eq!(json["candidates"][0]["genes"][0], 1.5);
        assert_eq!(json["candidates"][0]["score"], 0.25);
    }
}
