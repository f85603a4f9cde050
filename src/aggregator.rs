use crate::importance::Importance;
use crate::missing_articles::{ExistenceQuerier, MissingArticleRecord, QueryError};
use crate::size_index::SizeIndex;
use crate::tracked_items::TrackedItemTable;
use std::collections::HashMap;

/// Runs the existence query once per importance tier and annotates the
/// results with byte sizes. Unresolved table rows are excluded before the
/// query is built; tiers are queried independently, so a QID tracked under
/// two tiers can appear in both buckets.
///
/// A chunk failure in any tier aborts the whole aggregation. Returning the
/// tiers that happened to succeed would make a transport error look like
/// "no missing articles".
pub async fn missing_articles_by_importance(
    table: &TrackedItemTable,
    size_index: &SizeIndex,
    querier: &dyn ExistenceQuerier,
    language_code: &str,
) -> Result<HashMap<Importance, Vec<MissingArticleRecord>>, QueryError> {
    let mut buckets = HashMap::new();
    for importance in Importance::QUERIED {
        let qids = table.resolved_qids(importance);
        let mut records = querier.query_missing(&qids, language_code).await?;
        size_index.annotate(&mut records);
        buckets.insert(importance, records);
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Reports a fixed set of QIDs as missing, or fails for one language.
    struct FakeQuerier {
        missing: Vec<(String, String)>, // (qid, title)
        fail_when_contains: Option<String>,
    }

    #[async_trait]
    impl ExistenceQuerier for FakeQuerier {
        async fn query_missing(
            &self,
            qids: &[String],
            _language_code: &str,
        ) -> Result<Vec<MissingArticleRecord>, QueryError> {
            if let Some(poison) = &self.fail_when_contains {
                if qids.contains(poison) {
                    return Err(QueryError::ExistenceQueryFailure {
                        chunk_index: 0,
                        message: "connection reset".to_string(),
                    });
                }
            }
            // Sentinels must have been filtered out before the query is built
            assert!(!qids.iter().any(|q| q == "nan" || q == "N/A"));
            Ok(self
                .missing
                .iter()
                .filter(|(qid, _)| qids.contains(qid))
                .map(|(qid, title)| MissingArticleRecord {
                    qid: qid.clone(),
                    title: title.clone(),
                    en_link: Some(format!("https://en.wikipedia.org/wiki/{qid}")),
                    size_bytes: None,
                })
                .collect())
        }
    }

    fn table(rows: &str) -> TrackedItemTable {
        TrackedItemTable::from_tsv(&format!("title\timportance\tqid\n{rows}"))
            .expect("test table parses")
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        // Q1 has an article in fr, Q2 does not, Q3's tier query comes back empty
        let tracked = table("A\ttop\tQ1\nB\ttop\tQ2\nC\thigh\tQ3\n");
        let querier = FakeQuerier {
            missing: vec![("Q2".to_string(), "B-fr".to_string())],
            fail_when_contains: None,
        };
        let size_index = SizeIndex::from_json(r#"{"Q2": 900}"#).expect("index parses");
        let buckets =
            missing_articles_by_importance(&tracked, &size_index, &querier, "fr")
                .await
                .expect("aggregation succeeds");
        let top = &buckets[&Importance::Top];
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].qid, "Q2");
        assert_eq!(top[0].title, "B-fr");
        assert_eq!(top[0].size_bytes, Some(900));
        assert!(buckets[&Importance::High].is_empty());
        assert!(buckets[&Importance::Mid].is_empty());
        assert!(buckets[&Importance::Low].is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_rows_never_queried() {
        let tracked = table("A\ttop\tnan\nB\ttop\tQ2\nC\tmid\tN/A\n");
        let querier = FakeQuerier {
            missing: vec![("Q2".to_string(), "B".to_string())],
            fail_when_contains: None,
        };
        let buckets =
            missing_articles_by_importance(&tracked, &SizeIndex::default(), &querier, "de")
                .await
                .expect("aggregation succeeds");
        for records in buckets.values() {
            assert!(records.iter().all(|r| r.qid != "nan" && r.qid != "N/A"));
        }
        assert_eq!(buckets[&Importance::Top].len(), 1);
        assert!(buckets[&Importance::Mid].is_empty());
    }

    #[tokio::test]
    async fn test_tier_failure_is_fatal() {
        let tracked = table("A\ttop\tQ1\nB\tmid\tQ7\n");
        let querier = FakeQuerier {
            missing: vec![],
            fail_when_contains: Some("Q7".to_string()),
        };
        let result =
            missing_articles_by_importance(&tracked, &SizeIndex::default(), &querier, "fr").await;
        // The mid-tier failure propagates; no partial bucket map is returned
        assert!(matches!(
            result,
            Err(QueryError::ExistenceQueryFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_same_qid_in_two_tiers() {
        let tracked = table("A\ttop\tQ9\nA\tlow\tQ9\n");
        let querier = FakeQuerier {
            missing: vec![("Q9".to_string(), "A".to_string())],
            fail_when_contains: None,
        };
        let buckets =
            missing_articles_by_importance(&tracked, &SizeIndex::default(), &querier, "fr")
                .await
                .expect("aggregation succeeds");
        assert_eq!(buckets[&Importance::Top].len(), 1);
        assert_eq!(buckets[&Importance::Low].len(), 1);
    }
}
