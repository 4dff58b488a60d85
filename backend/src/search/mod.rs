//! Tantivy-based search index module.
//!
//! Provides full-text search over tickets with field boosting. The index only
//! ranks ids; callers load the tickets back through the repository so that
//! scope filtering stays in SQL.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Ticket;

const BOOST_TITLE: f32 = 10.0;
const BOOST_LABELS: f32 = 7.0;
const BOOST_DESCRIPTION: f32 = 5.0;
const BOOST_PROJECT: f32 = 2.5;

/// Search hit with relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub ticket_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    ticket_id: Field,
    title: Field,
    description: Field,
    labels: Field,
    project_name: Field,
}

/// Tantivy search index for tickets.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // Raw token so updates and deletes can address the document by id.
        let ticket_id = schema_builder.add_text_field("ticket_id", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let labels = schema_builder.add_text_field("labels", TEXT);
        let project_name = schema_builder.add_text_field("project_name", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            ticket_id,
            title,
            description,
            labels,
            project_name,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from tickets.
    pub async fn rebuild(&self, tickets: &[Ticket]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for ticket in tickets {
            writer.add_document(self.create_document(ticket))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} tickets", tickets.len());
        Ok(())
    }

    /// Index or re-index a single ticket.
    pub async fn index_ticket(&self, ticket: &Ticket) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.ticket_id, &ticket.id);
        writer.delete_term(term);
        writer.add_document(self.create_document(ticket))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a ticket from the index.
    pub async fn remove_ticket(&self, ticket_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.ticket_id, ticket_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for tickets matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.title,
                self.fields.description,
                self.fields.labels,
                self.fields.project_name,
            ],
        );

        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();

        let field_queries = [
            (self.fields.title, BOOST_TITLE),
            (self.fields.labels, BOOST_LABELS),
            (self.fields.description, BOOST_DESCRIPTION),
            (self.fields.project_name, BOOST_PROJECT),
        ];

        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                let boosted = BoostQuery::new(field_query, boost);
                subqueries.push((Occur::Should, Box::new(boosted)));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchResult> = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let ticket_id = doc.get_first(self.fields.ticket_id)?.as_str()?.to_string();
                Some(SearchResult { ticket_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, ticket: &Ticket) -> TantivyDocument {
        doc!(
            self.fields.ticket_id => ticket.id.clone(),
            self.fields.title => ticket.title.clone(),
            self.fields.description => ticket.description.clone(),
            self.fields.labels => ticket.labels.join(" "),
            self.fields.project_name => ticket.project_name.clone()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests_support::ticket;
    use tempfile::TempDir;

    fn create_test_ticket(id: &str, title: &str, labels: &[&str]) -> Ticket {
        let mut t = ticket(id, "p1");
        t.title = title.to_string();
        t.labels = labels.iter().map(|s| s.to_string()).collect();
        t
    }

    #[tokio::test]
    async fn test_search_ranks_title_matches() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let tickets = vec![
            create_test_ticket("1", "Login page crashes", &["frontend"]),
            create_test_ticket("2", "Slow export", &["backend", "login"]),
        ];
        index.rebuild(&tickets).await.unwrap();

        let results = index.search("login", 10, 0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].ticket_id, "1");
    }

    #[tokio::test]
    async fn test_reindex_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let mut t = create_test_ticket("1", "Broken upload", &[]);
        index.index_ticket(&t).await.unwrap();
        t.title = "Broken download".to_string();
        index.index_ticket(&t).await.unwrap();

        assert!(index.search("upload", 10, 0).unwrap().is_empty());
        assert_eq!(index.search("download", 10, 0).unwrap().len(), 1);

        index.remove_ticket("1").await.unwrap();
        assert!(index.search("download", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", 10, 0).unwrap();
        assert!(results.is_empty());
    }
}
