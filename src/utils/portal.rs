use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use log::{debug, info};
use scraper::{Html, Selector};
use crate::error::Result;
use crate::models::Career;
use crate::utils::html::{element_text, input_value, label_after};
use crate::utils::session::{Session, UNKNOWN_USER};

const RECORDS_PATH: &str = "calificaciones/ver_calif_show.php";
const PERIOD_PATH: &str = "alumnos/consulta_solicitud_retiro_temporal.php";

static CAREER_OPTIONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select[name=cambio_carrera] option").unwrap());
static PERIOD_INPUT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input#periodo_acad").unwrap());

// Hidden fields of a records page that the portal expects to be echoed back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordsForm {
    pub student_id: String,
    pub program_code: String,
    pub plan_code: String,
    pub admission_year: String,
    pub admission_period: String,
    pub year: String,
}

impl RecordsForm {
    pub fn from_html(html: &str) -> RecordsForm {
        let document = Html::parse_document(html);
        let field = |name: &str| input_value(&document, name);

        RecordsForm {
            student_id: field("alu_rut"),
            program_code: field("crr_codigo"),
            plan_code: field("pca_codigo"),
            admission_year: field("alc_ano_ingreso"),
            admission_period: field("alc_periodo"),
            year: field("anio"),
        }
    }
}

// Fetches the default records page. The `_` parameter keeps intermediaries from caching it.
pub async fn fetch_records_page(session: &Session) -> Result<String> {
    let url = format!("{}?_={}", session.url(RECORDS_PATH), cache_buster());
    info!("Fetching records page for session {}", session.id());
    session.http().get_text(&url).await
}

pub async fn list_careers(session: &Session) -> Result<Vec<Career>> {
    let html = fetch_records_page(session).await?;
    parse_careers(&html)
}

// Reads the career selector. Every option value must split into exactly four codes.
pub fn parse_careers(html: &str) -> Result<Vec<Career>> {
    let document = Html::parse_document(html);
    document
        .select(&CAREER_OPTIONS)
        .map(|option| {
            let value = option.value().attr("value").unwrap_or("").trim();
            Career::from_option(&element_text(&option), value)
        })
        .collect()
}

// "Nombres Apellidos" as printed on the records page.
pub fn parse_full_name(html: &str) -> String {
    let document = Html::parse_document(html);
    let full_name = format!("{} {}", label_after(&document, "Nombres"), label_after(&document, "Apellidos"));
    let full_name = full_name.trim();
    if full_name.is_empty() { UNKNOWN_USER.to_string() } else { full_name.to_string() }
}

pub async fn current_academic_period(session: &Session) -> Result<String> {
    let html = session.http().get_text(&session.url(PERIOD_PATH)).await?;
    Ok(parse_academic_period(&html))
}

pub fn parse_academic_period(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&PERIOD_INPUT)
        .next()
        .and_then(|input| input.value().attr("value"))
        .unwrap_or("")
        .trim()
        .to_string()
}

// Switches the records page to the given career. Returns the page listing its courses.
pub async fn fetch_career_records(session: &Session, career: &Career) -> Result<String> {
    let records = RecordsForm::from_html(&fetch_records_page(session).await?);
    let period = current_academic_period(session).await?;
    debug!(
        "Session {}: switching to career {} (year {}, period {})",
        session.id(),
        career.raw_option_value,
        records.year,
        period
    );

    let form = [
        ("volver", "volver"),
        ("url_volver", ""),
        ("alu_rut", records.student_id.as_str()),
        ("crr_codigo", career.program_code.as_str()),
        ("pca_codigo", career.plan_code.as_str()),
        ("alc_ano_ingreso", career.admission_year.as_str()),
        ("alc_periodo", career.admission_period.as_str()),
        ("anio", records.year.as_str()),
        ("periodo", period.as_str()),
        ("cambio_carrera", career.raw_option_value.as_str()),
    ];

    session.http().post_text(&session.url(RECORDS_PATH), &form).await
}

fn cache_buster() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;

    const RECORDS: &str = r#"
        <form>
          <input type="hidden" name="alu_rut" value="12345678">
          <input type="hidden" name="crr_codigo" value="29040">
          <input type="hidden" name="pca_codigo" value="2">
          <input type="hidden" name="alc_ano_ingreso" value="2021">
          <input type="hidden" name="alc_periodo" value="1">
          <input type="hidden" name="anio" value="2024">
          <select name="cambio_carrera">
            <option value="29040-2-2021-1">INGENIERIA CIVIL INFORMATICA</option>
            <option value="29030-1-2019-2">INGENIERIA DE EJECUCION</option>
          </select>
        </form>
        <label class="blue">Nombres</label><label>ANA MARIA</label>
        <label class="blue">Apellidos</label><label>ROJAS</label>"#;

    #[test]
    fn lists_careers_in_order() {
        let careers = parse_careers(RECORDS).unwrap();
        assert_eq!(careers.len(), 2);
        assert_eq!(careers[0].name, "INGENIERIA CIVIL INFORMATICA");
        assert_eq!(careers[1].program_code, "29030");
        assert_eq!(careers[1].admission_period, "2");
    }

    #[test]
    fn malformed_option_is_fatal() {
        let html = r#"<select name="cambio_carrera"><option value="29040-2">X</option></select>"#;
        assert!(matches!(parse_careers(html), Err(PortalError::MalformedOption(_))));
    }

    #[test]
    fn reads_hidden_fields() {
        let form = RecordsForm::from_html(RECORDS);
        assert_eq!(form.student_id, "12345678");
        assert_eq!(form.program_code, "29040");
        assert_eq!(form.year, "2024");
    }

    #[test]
    fn reads_full_name_and_period() {
        assert_eq!(parse_full_name(RECORDS), "ANA MARIA ROJAS");
        assert_eq!(parse_full_name("<p></p>"), UNKNOWN_USER);
        assert_eq!(parse_academic_period(r#"<input id="periodo_acad" value="2">"#), "2");
        assert_eq!(parse_academic_period("<p></p>"), "");
    }
}
