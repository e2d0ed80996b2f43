use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    error::AppResult,
    models::{PeerId, RecommendationOutcome, UserProfile},
    services::{
        profile::profile_summary_text,
        providers::HistoryStore,
        retriever::{PeerSearch, SimilarityRetriever},
    },
};

/// Picks the course most often taken by peers, ignoring `excluded` ids
///
/// Every occurrence counts. Among equal counts the course seen first wins,
/// iterating peers in the given order and each peer's courses in listed order.
pub fn recommend(excluded: &HashSet<String>, peers: &[(PeerId, Vec<String>)]) -> Option<String> {
    // course -> (count, first-seen position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut position = 0;

    for (_, courses) in peers {
        for course in courses {
            if excluded.contains(course) {
                continue;
            }
            counts.entry(course.as_str()).or_insert((0, position)).0 += 1;
            position += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, seen_a)), (_, (count_b, seen_b))| {
            count_a.cmp(count_b).then(seen_b.cmp(seen_a))
        })
        .map(|(course, _)| course.to_string())
}

/// Peer-based recommendation of one additional course
pub struct RecommendationService {
    retriever: SimilarityRetriever,
    history: Arc<dyn HistoryStore>,
    peer_count: usize,
}

impl RecommendationService {
    pub fn new(
        retriever: SimilarityRetriever,
        history: Arc<dyn HistoryStore>,
        peer_count: usize,
    ) -> Self {
        Self {
            retriever,
            history,
            peer_count,
        }
    }

    /// Recommends a course the student has neither taken nor planned
    ///
    /// `planned` holds course codes the student already intends to take, and the
    /// profile's taken courses are expected as course codes too. A query that
    /// could not be embedded or peer histories that could not be read yield
    /// `Unavailable` rather than an error.
    pub async fn recommend_for(
        &self,
        profile: &UserProfile,
        planned: &[String],
    ) -> AppResult<RecommendationOutcome> {
        tracing::info!(
            taken = profile.taken_courses.len(),
            planned = planned.len(),
            "Recommendation started"
        );

        let query = profile_summary_text(profile);
        let peers = match self.retriever.search(&query, self.peer_count).await? {
            PeerSearch::Found(peers) => peers,
            PeerSearch::QueryNotEmbedded => {
                tracing::warn!("Profile could not be embedded, no recommendation made");
                return Ok(RecommendationOutcome::Unavailable {
                    reason: "query embedding unavailable".to_string(),
                });
            }
        };

        if peers.is_empty() {
            tracing::info!("No similar peers found");
            return Ok(RecommendationOutcome::Empty);
        }

        let peer_courses = match self.history.peer_course_codes(&peers).await {
            Ok(courses) => courses,
            Err(e) => {
                tracing::warn!(error = %e, peers = peers.len(), "Peer history lookup failed");
                return Ok(RecommendationOutcome::Unavailable {
                    reason: e.to_string(),
                });
            }
        };

        let excluded: HashSet<String> = profile
            .taken_course_ids()
            .map(str::to_string)
            .chain(planned.iter().cloned())
            .collect();

        tracing::debug!(excluded = excluded.len(), peers = peers.len(), "Counting peer courses");

        let outcome = RecommendationOutcome::from(recommend(&excluded, &peer_courses));
        match &outcome {
            RecommendationOutcome::Recommended { course_id } => {
                tracing::info!(course_id = %course_id, "Course recommended")
            }
            _ => tracing::info!("No course left to recommend"),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::CourseHistory,
        models::LetterGrade,
        services::{
            embedding::{EmbeddingGenerator, EmbeddingModel},
            providers::{MockEmbeddingProvider, MockHistoryStore, MockPeerVectorStore, PeerMatch},
            RetryPolicy,
        },
    };

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn excluded(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_most_frequent_course_wins() {
        let peers = vec![
            (PeerId(1), ids(&["X", "Y"])),
            (PeerId(2), ids(&["X", "Z"])),
        ];
        assert_eq!(recommend(&excluded(&["Y"]), &peers), Some("X".to_string()));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let peers = vec![
            (PeerId(1), ids(&["X", "Y"])),
            (PeerId(2), ids(&["Y", "X"])),
        ];
        assert_eq!(recommend(&HashSet::new(), &peers), Some("X".to_string()));

        let reversed = vec![
            (PeerId(2), ids(&["Y", "X"])),
            (PeerId(1), ids(&["X", "Y"])),
        ];
        assert_eq!(recommend(&HashSet::new(), &reversed), Some("Y".to_string()));
    }

    #[test]
    fn test_tie_ignores_excluded_positions() {
        // Q is excluded; R is first seen among the remaining equal counts
        let peers = vec![(PeerId(1), ids(&["Q", "R", "S"]))];
        assert_eq!(recommend(&excluded(&["Q"]), &peers), Some("R".to_string()));
    }

    #[test]
    fn test_everything_excluded_returns_none() {
        let peers = vec![(PeerId(1), ids(&["A", "B"])), (PeerId(2), ids(&["B"]))];
        assert_eq!(recommend(&excluded(&["A", "B"]), &peers), None);
    }

    #[test]
    fn test_no_peers_returns_none() {
        assert_eq!(recommend(&HashSet::new(), &[]), None);
    }

    #[test]
    fn test_never_returns_excluded_course() {
        let peers = vec![
            (PeerId(1), ids(&["A", "A", "A", "B"])),
            (PeerId(2), ids(&["A", "C"])),
            (PeerId(3), ids(&["C", "D"])),
        ];
        for blocked in [&["A"][..], &["A", "C"], &["A", "B", "C", "D"], &["D"]] {
            let excluded = excluded(blocked);
            if let Some(course) = recommend(&excluded, &peers) {
                assert!(!excluded.contains(&course));
            }
        }
    }

    #[test]
    fn test_repeated_course_within_peer_counts_each_time() {
        let peers = vec![
            (PeerId(1), ids(&["A", "B"])),
            (PeerId(2), ids(&["B", "C", "C", "C"])),
        ];
        assert_eq!(recommend(&HashSet::new(), &peers), Some("C".to_string()));
    }

    fn retriever_returning(peers: Vec<i64>) -> SimilarityRetriever {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_dimensions().return_const(1usize);
        provider
            .expect_encode()
            .returning(|batch| Ok(batch.iter().map(|_| vec![1.0]).collect()));

        let mut store = MockPeerVectorStore::new();
        store.expect_top_k().returning(move |_, _| {
            Ok(peers
                .iter()
                .map(|id| PeerMatch {
                    peer_id: PeerId(*id),
                    distance: 0.1,
                })
                .collect())
        });

        SimilarityRetriever::new(
            EmbeddingGenerator::new(EmbeddingModel::ready(Arc::new(provider)), RetryPolicy::none()),
            Arc::new(store),
        )
    }

    fn profile_with(taken: &[&str]) -> UserProfile {
        UserProfile {
            taken_courses: taken
                .iter()
                .map(|id| CourseHistory {
                    course_id: id.to_string(),
                    grade: LetterGrade::A,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_recommend_for_excludes_taken_and_planned() {
        let mut history = MockHistoryStore::new();
        history
            .expect_peer_course_codes()
            .withf(|peers| peers == [PeerId(1), PeerId(2)])
            .returning(|peers| {
                Ok(vec![
                    (peers[0], ids(&["CSE101", "CSE201", "CSE301"])),
                    (peers[1], ids(&["CSE101", "CSE201", "MAT101"])),
                ])
            });

        let service = RecommendationService::new(retriever_returning(vec![1, 2]), Arc::new(history), 5);
        let outcome = service
            .recommend_for(&profile_with(&["CSE101"]), &ids(&["CSE201"]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RecommendationOutcome::Recommended {
                course_id: "CSE301".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_recommend_for_empty_when_nothing_new() {
        let mut history = MockHistoryStore::new();
        history
            .expect_peer_course_codes()
            .returning(|peers| Ok(vec![(peers[0], ids(&["CSE101"]))]));

        let service = RecommendationService::new(retriever_returning(vec![1]), Arc::new(history), 5);
        let outcome = service
            .recommend_for(&profile_with(&["CSE101"]), &[])
            .await
            .unwrap();

        assert_eq!(outcome, RecommendationOutcome::Empty);
    }

    #[tokio::test]
    async fn test_recommend_for_history_failure_is_unavailable() {
        let mut history = MockHistoryStore::new();
        history
            .expect_peer_course_codes()
            .returning(|_| Err(AppError::Internal("pool timed out".to_string())));

        let service = RecommendationService::new(retriever_returning(vec![1]), Arc::new(history), 5);
        let outcome = service.recommend_for(&profile_with(&[]), &[]).await.unwrap();

        assert!(matches!(
            outcome,
            RecommendationOutcome::Unavailable { ref reason } if reason.contains("pool timed out")
        ));
    }

    #[tokio::test]
    async fn test_recommend_for_without_peers_skips_history() {
        let mut history = MockHistoryStore::new();
        history.expect_peer_course_codes().never();

        let service = RecommendationService::new(retriever_returning(vec![]), Arc::new(history), 5);
        let outcome = service.recommend_for(&profile_with(&[]), &[]).await.unwrap();

        assert_eq!(outcome, RecommendationOutcome::Empty);
    }

    #[tokio::test]
    async fn test_recommend_for_unembedded_query_is_unavailable() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_dimensions().return_const(1usize);
        provider
            .expect_encode()
            .returning(|_| Err(AppError::Embedding("model crashed".to_string())));

        let mut store = MockPeerVectorStore::new();
        store.expect_top_k().never();
        let retriever = SimilarityRetriever::new(
            EmbeddingGenerator::new(EmbeddingModel::ready(Arc::new(provider)), RetryPolicy::none()),
            Arc::new(store),
        );

        let mut history = MockHistoryStore::new();
        history.expect_peer_course_codes().never();

        let service = RecommendationService::new(retriever, Arc::new(history), 5);
        let outcome = service.recommend_for(&profile_with(&[]), &[]).await.unwrap();

        assert_eq!(
            outcome,
            RecommendationOutcome::Unavailable {
                reason: "query embedding unavailable".to_string()
            }
        );
    }
}
