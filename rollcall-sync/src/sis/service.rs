//! Typed access to the upstream endpoints
//!
//! [`SisApi`] is the seam the sync strategies depend on; [`SisService`] is the
//! HTTP implementation. Every method returns the plain record list, already
//! unwrapped from its envelope.

use super::extract::extract_records;
use super::{SisClient, SisError};
use async_trait::async_trait;
use rollcall_common::config::{EndpointConfig, Endpoints};
use serde_json::Value;

/// Upstream record source
#[async_trait]
pub trait SisApi: Send + Sync {
    /// One page of year groups (homerooms)
    async fn year_groups(&self, page: u32, per_page: u32) -> Result<Vec<Value>, SisError>;

    /// All students of one year group (single call, not paginated)
    async fn year_group_students(&self, homeroom_id: i64) -> Result<Vec<Value>, SisError>;

    /// One page of students filtered by homeroom advisor
    async fn advisor_students(&self, advisor_id: i64, page: u32, per_page: u32) -> Result<Vec<Value>, SisError>;

    /// One page of classes
    async fn classes(&self, page: u32, per_page: u32) -> Result<Vec<Value>, SisError>;

    /// Term grades of one student; 404 when the tenant lacks this endpoint
    async fn student_term_grades(&self, student_id: i64, term_id: &str) -> Result<Vec<Value>, SisError>;

    /// Term grades of every student in one class
    async fn class_term_grades(&self, class_id: i64, term_id: &str) -> Result<Vec<Value>, SisError>;

    /// One page of behaviour notes, optionally only those modified since a cursor
    async fn behaviour_notes(
        &self,
        student_ids: &[i64],
        modified_since: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, SisError>;

    /// Attendance events of one term
    async fn term_attendance(
        &self,
        term_id: &str,
        student_ids: &[i64],
        homeroom_id: Option<i64>,
    ) -> Result<Vec<Value>, SisError>;
}

/// [`SisApi`] over HTTP
pub struct SisService {
    client: SisClient,
    endpoints: Endpoints,
}

impl SisService {
    pub fn new(client: SisClient, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn fetch(
        &self,
        endpoint: &EndpointConfig,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>, SisError> {
        let payload = self.client.get(path, query).await?;
        Ok(extract_records(payload, &endpoint.envelope_keys))
    }
}

fn paging(page: u32, per_page: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("per_page", per_page.to_string())]
}

fn student_id_params(student_ids: &[i64]) -> impl Iterator<Item = (&'static str, String)> + '_ {
    student_ids.iter().map(|id| ("student_ids", id.to_string()))
}

#[async_trait]
impl SisApi for SisService {
    async fn year_groups(&self, page: u32, per_page: u32) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.year_groups;
        self.fetch(endpoint, &endpoint.path, &paging(page, per_page)).await
    }

    async fn year_group_students(&self, homeroom_id: i64) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.year_group_students;
        self.fetch(endpoint, &endpoint.path_for(homeroom_id), &[]).await
    }

    async fn advisor_students(&self, advisor_id: i64, page: u32, per_page: u32) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.students;
        let mut query = vec![("homeroom_advisor_id", advisor_id.to_string())];
        query.extend(paging(page, per_page));
        self.fetch(endpoint, &endpoint.path, &query).await
    }

    async fn classes(&self, page: u32, per_page: u32) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.classes;
        self.fetch(endpoint, &endpoint.path, &paging(page, per_page)).await
    }

    async fn student_term_grades(&self, student_id: i64, term_id: &str) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.student_term_grades;
        let query = [("term_id", term_id.to_string())];
        self.fetch(endpoint, &endpoint.path_for(student_id), &query).await
    }

    async fn class_term_grades(&self, class_id: i64, term_id: &str) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.class_term_grades;
        let query = [("term_id", term_id.to_string())];
        self.fetch(endpoint, &endpoint.path_for(class_id), &query).await
    }

    async fn behaviour_notes(
        &self,
        student_ids: &[i64],
        modified_since: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.behaviour_notes;
        let mut query: Vec<(&str, String)> = student_id_params(student_ids).collect();
        query.extend(paging(page, per_page));
        if let Some(since) = modified_since {
            query.push(("modified_since", since.to_string()));
        }
        self.fetch(endpoint, &endpoint.path, &query).await
    }

    async fn term_attendance(
        &self,
        term_id: &str,
        student_ids: &[i64],
        homeroom_id: Option<i64>,
    ) -> Result<Vec<Value>, SisError> {
        let endpoint = &self.endpoints.term_attendance;
        let mut query = vec![("term_id", term_id.to_string())];
        query.extend(student_id_params(student_ids));
        if let Some(id) = homeroom_id {
            query.push(("homeroom_id", id.to_string()));
        }
        self.fetch(endpoint, &endpoint.path, &query).await
    }
}
