//! Scripted in-process [`SisApi`] for strategy tests

use crate::sis::{SisApi, SisError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) fn status(code: u16) -> SisError {
    SisError::Status {
        status: code,
        url: "fake".to_string(),
        body: String::new(),
    }
}

/// Canned responses; page lists are 1-indexed by position
#[derive(Default)]
pub(crate) struct FakeSis {
    pub year_groups: Vec<Value>,
    pub year_group_students: HashMap<i64, Vec<Value>>,
    pub advisor_pages: Vec<Vec<Value>>,
    pub classes: Vec<Value>,
    /// Missing entries answer `[]`; `Err(code)` answers that status
    pub student_grades: HashMap<i64, Result<Vec<Value>, u16>>,
    pub class_grades: HashMap<i64, Vec<Value>>,
    pub behaviour_pages: Vec<Vec<Value>>,
    pub attendance: Option<Result<Vec<Value>, u16>>,
    /// Call log, e.g. `student_term_grades:5`
    pub calls: Mutex<Vec<String>>,
    /// `modified_since` seen by each behaviour page request
    pub behaviour_cursors: Mutex<Vec<Option<String>>>,
}

impl FakeSis {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn page_of(pages: &[Vec<Value>], page: u32) -> Vec<Value> {
    pages.get(page as usize - 1).cloned().unwrap_or_default()
}

#[async_trait]
impl SisApi for FakeSis {
    async fn year_groups(&self, page: u32, _per_page: u32) -> Result<Vec<Value>, SisError> {
        self.record(format!("year_groups:{}", page));
        Ok(if page == 1 { self.year_groups.clone() } else { Vec::new() })
    }

    async fn year_group_students(&self, homeroom_id: i64) -> Result<Vec<Value>, SisError> {
        self.record(format!("year_group_students:{}", homeroom_id));
        Ok(self.year_group_students.get(&homeroom_id).cloned().unwrap_or_default())
    }

    async fn advisor_students(&self, advisor_id: i64, page: u32, _per_page: u32) -> Result<Vec<Value>, SisError> {
        self.record(format!("advisor_students:{}:{}", advisor_id, page));
        Ok(page_of(&self.advisor_pages, page))
    }

    async fn classes(&self, page: u32, _per_page: u32) -> Result<Vec<Value>, SisError> {
        self.record(format!("classes:{}", page));
        Ok(if page == 1 { self.classes.clone() } else { Vec::new() })
    }

    async fn student_term_grades(&self, student_id: i64, _term_id: &str) -> Result<Vec<Value>, SisError> {
        self.record(format!("student_term_grades:{}", student_id));
        match self.student_grades.get(&student_id) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(code)) => Err(status(*code)),
            None => Ok(Vec::new()),
        }
    }

    async fn class_term_grades(&self, class_id: i64, _term_id: &str) -> Result<Vec<Value>, SisError> {
        self.record(format!("class_term_grades:{}", class_id));
        Ok(self.class_grades.get(&class_id).cloned().unwrap_or_default())
    }

    async fn behaviour_notes(
        &self,
        _student_ids: &[i64],
        modified_since: Option<&str>,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<Value>, SisError> {
        self.record(format!("behaviour_notes:{}", page));
        self.behaviour_cursors
            .lock()
            .unwrap()
            .push(modified_since.map(str::to_string));
        Ok(page_of(&self.behaviour_pages, page))
    }

    async fn term_attendance(
        &self,
        _term_id: &str,
        _student_ids: &[i64],
        homeroom_id: Option<i64>,
    ) -> Result<Vec<Value>, SisError> {
        self.record(format!("term_attendance:{:?}", homeroom_id));
        match &self.attendance {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(code)) => Err(status(*code)),
            None => Ok(Vec::new()),
        }
    }
}
