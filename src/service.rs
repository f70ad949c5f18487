use std::sync::Arc;
use futures::future::join_all;
use log::{info, warn};
use crate::config::PortalConfig;
use crate::error::Result;
use crate::models::{Career, CourseAverage, Dashboard, LoginResponse};
use crate::utils::accounts::{register_login, AccountStore, SecretCipher};
use crate::utils::average::compute_average;
use crate::utils::courses::parse_course_rows;
use crate::utils::portal::{self, RecordsForm};
use crate::utils::session::{acquire_session, LoginOutcome, Session};

// The operations offered to the outer request layer. Every call after login is addressed
// by the session identifier the caller got back from `login`.
pub struct GradeService {
    config: PortalConfig,
    accounts: Arc<dyn AccountStore>,
    cipher: Arc<dyn SecretCipher>,
}

impl GradeService {
    pub fn new(config: PortalConfig, accounts: Arc<dyn AccountStore>, cipher: Arc<dyn SecretCipher>) -> Self {
        GradeService { config, accounts, cipher }
    }

    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse> {
        match acquire_session(&self.config, identifier, secret).await? {
            LoginOutcome::Success(success) => {
                let display_name = success.display_name();
                register_login(self.accounts.as_ref(), self.cipher.as_ref(), identifier, &display_name, secret)?;

                Ok(LoginResponse {
                    success: true,
                    session_id: Some(success.session.id().to_string()),
                    debug_info: None,
                })
            }
            LoginOutcome::Failure(failure) => {
                Ok(LoginResponse { success: false, session_id: None, debug_info: Some(failure.debug_info) })
            }
        }
    }

    pub async fn list_careers(&self, session_id: &str) -> Result<Vec<Career>> {
        let session = Session::resume(&self.config, session_id)?;
        portal::list_careers(&session).await
    }

    // Raw records HTML: the default page, or the page of the given career.
    pub async fn get_course_rows(&self, session_id: &str, career: Option<&Career>) -> Result<String> {
        let session = Session::resume(&self.config, session_id)?;
        match career {
            Some(career) => portal::fetch_career_records(&session, career).await,
            None => portal::fetch_records_page(&session).await,
        }
    }

    // Averages for every course of a career, in the order the portal lists them.
    // A course that cannot be computed is reported with 0.0.
    pub async fn get_parsed_courses(&self, session_id: &str, career: &Career) -> Result<Vec<CourseAverage>> {
        let session = Session::resume(&self.config, session_id)?;
        let html = portal::fetch_career_records(&session, career).await?;
        let records = RecordsForm::from_html(&html);
        let rows = parse_course_rows(&html);
        info!("Session {}: {} courses for career {}", session.id(), rows.len(), career.raw_option_value);

        let averages = join_all(rows.iter().map(|row| {
            let session = &session;
            let records = &records;
            async move {
                let average = match compute_average(session, row, records).await {
                    Ok(average) => average,
                    Err(e) => {
                        warn!("Session {}: error computing average for {}: {}", session.id(), row.course_name, e);
                        0.0
                    }
                };
                CourseAverage { name: row.course_name.clone(), average }
            }
        }))
        .await;

        Ok(averages)
    }

    pub async fn get_dashboard(&self, session_id: &str) -> Result<Dashboard> {
        let session = Session::resume(&self.config, session_id)?;
        let html = portal::fetch_records_page(&session).await?;

        Ok(Dashboard { full_name: portal::parse_full_name(&html), careers: portal::parse_careers(&html)? })
    }
}
