//! In-memory vector store with cosine nearest-neighbour search.
//!
//! Reads and writes both go through one mutex, so a query never sees a
//! half-written vector. The store is bounded by library size and queries are
//! linear scans.

use crate::math::{self, MathError};
use music_library::SongId;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct VectorStore {
    vectors: Mutex<HashMap<SongId, Vec<f64>>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SongId, Vec<f64>>> {
        self.vectors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the vector for `id`.
    pub fn store(&self, id: impl Into<SongId>, vector: Vec<f64>) -> math::Result<()> {
        if vector.is_empty() {
            return Err(MathError::Empty);
        }
        if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
            return Err(MathError::NonFinite { index });
        }
        self.lock().insert(id.into(), vector);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Vec<f64>> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Vec<f64>> {
        self.lock().remove(id)
    }

    /// Top `top_k` stored vectors by cosine similarity to `query`, descending.
    ///
    /// Stored vectors of a different dimension are skipped.
    pub fn find_similar(&self, query: &[f64], top_k: usize) -> math::Result<Vec<(SongId, f64)>> {
        if query.is_empty() {
            return Err(MathError::Empty);
        }
        if let Some(index) = query.iter().position(|x| !x.is_finite()) {
            return Err(MathError::NonFinite { index });
        }

        let mut scored: Vec<(SongId, f64)> = {
            let vectors = self.lock();
            vectors
                .par_iter()
                .filter_map(|(id, v)| {
                    math::cosine_similarity(query, v)
                        .ok()
                        .map(|sim| (id.clone(), sim))
                })
                .collect()
        };

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_store_overwrites() {
        let store = VectorStore::new();
        store.store("a", vec![1.0, 0.0]).unwrap();
        store.store("a", vec![0.0, 1.0]).unwrap();
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("a"), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_find_similar_ranked() {
        let store = VectorStore::new();
        store.store("same", vec![1.0, 1.0]).unwrap();
        store.store("close", vec![1.0, 0.8]).unwrap();
        store.store("far", vec![-1.0, 0.1]).unwrap();
        store.store("other_dim", vec![1.0, 1.0, 1.0]).unwrap();

        let hits = store.find_similar(&[1.0, 1.0], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["same", "close"]);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn test_rejects_bad_vectors() {
        let store = VectorStore::new();
        assert!(store.store("nan", vec![f64::NAN]).is_err());
        assert!(store.store("empty", vec![]).is_err());
        assert!(store.find_similar(&[], 3).is_err());
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(VectorStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        let v = vec![t as f64 + 1.0, i as f64 + 1.0, 1.0];
                        store.store(format!("{t}-{i}"), v).unwrap();
                        let hits = store.find_similar(&[1.0, 1.0, 1.0], 3).unwrap();
                        assert!(hits.iter().all(|(_, s)| (-1.0..=1.0).contains(s)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.size(), 200);

        store.clear();
        assert_eq!(store.size(), 0);
    }
}
