use std::sync::LazyLock;
use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use urlencoding::encode;
use crate::error::{PortalError, Result};
use crate::models::{CourseRow, Evaluation, SubEvaluation};
use crate::utils::html::{element_text, headings, next_element, siblings_after_heading};
use crate::utils::portal::RecordsForm;
use crate::utils::session::Session;

const STANDARD_MARKER: &str = "abrir_CalifShow";
const MODULAR_MARKER: &str = "ver_calificacion_modular";
const STANDARD_DETAIL_PATH: &str = "calificaciones/remote_ver_calif_greybox.php";
const MODULAR_DETAIL_PATH: &str = "calificaciones_escala/detalle_calificacion_modular.php";

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D+").unwrap());
static TABLE_ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tbody tr").unwrap());
static GRADE_CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tbody tr.Tabla3 td").unwrap());
static BODY_ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static BOOK_ICON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("i.fa-book").unwrap());
static CHEVRON_ICON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("i.fa-chevron-right").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLayout {
    Standard,
    Modular,
}

// The detail endpoint is named inside the trigger's inline handler.
pub fn detect_layout(payload: &str) -> Option<DetailLayout> {
    if payload.contains(MODULAR_MARKER) {
        Some(DetailLayout::Modular)
    } else if payload.contains(STANDARD_MARKER) {
        Some(DetailLayout::Standard)
    } else {
        None
    }
}

// "fn(a, 'b', c)" -> ["a", "b", "c"]
pub fn payload_arguments(payload: &str) -> Option<Vec<String>> {
    let open = payload.find('(')?;
    let close = payload.rfind(')')?;
    if close <= open {
        return None;
    }

    Some(
        payload[open + 1..close]
            .split(',')
            .map(|arg| arg.trim().trim_matches(|c: char| c == '\'' || c == '"').trim().to_string())
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardArgs {
    pub student_id: String,
    pub subject_code: String,
    pub year: String,
    pub period: String,
    pub section: String,
    pub name: String,
}

impl StandardArgs {
    pub fn parse(course: &str, payload: &str) -> Result<StandardArgs> {
        let args = payload_arguments(payload).ok_or_else(|| PortalError::course(course, "payload has no argument list"))?;
        if args.len() < 6 {
            return Err(PortalError::course(course, format!("expected 6 detail arguments, found {}", args.len())));
        }

        Ok(StandardArgs {
            student_id: args[0].clone(),
            subject_code: NON_DIGITS.replace_all(&args[1], "").into_owned(),
            year: args[2].clone(),
            period: args[3].clone(),
            section: args[4].clone(),
            name: args[5].clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModularArgs {
    pub subject_code: String,
    pub section: String,
    pub year: String,
    pub period: String,
}

impl ModularArgs {
    pub fn parse(course: &str, payload: &str) -> Result<ModularArgs> {
        let args = payload_arguments(payload).ok_or_else(|| PortalError::course(course, "payload has no argument list"))?;
        if args.len() < 4 {
            return Err(PortalError::course(course, format!("expected 4 detail arguments, found {}", args.len())));
        }

        Ok(ModularArgs {
            subject_code: NON_DIGITS.replace_all(&args[0], "").into_owned(),
            section: args[1].clone(),
            year: args[2].clone(),
            period: args[3].clone(),
        })
    }
}

// Fetches a course's detail page and computes its average with the rule of its layout.
// Courses without a detail link average 0.0.
pub async fn compute_average(session: &Session, row: &CourseRow, records: &RecordsForm) -> Result<f64> {
    let course = row.course_name.as_str();
    let payload = match row.detail_link_payload.as_deref() {
        Some(payload) => payload,
        None => return Ok(0.0),
    };

    match detect_layout(payload) {
        Some(DetailLayout::Standard) => {
            let args = StandardArgs::parse(course, payload)?;
            let html = fetch_standard_detail(session, &args, row.row_index).await?;
            let evaluations = parse_standard(course, &html)?;
            Ok(projected_average(course, &evaluations))
        }
        Some(DetailLayout::Modular) => {
            let args = ModularArgs::parse(course, payload)?;
            let html = fetch_modular_detail(session, &args, records).await?;
            let evaluations = parse_modular(course, &html);
            Ok(module_average(course, &evaluations))
        }
        None => Err(PortalError::course(course, "unknown detail endpoint in payload")),
    }
}

// The detail endpoint is addressed by the row position (`det`), not by the subject.
async fn fetch_standard_detail(session: &Session, args: &StandardArgs, row_index: usize) -> Result<String> {
    let url = format!(
        "{}?det={}&alu_rut={}&agn_codigo={}&ano={}&periodo={}&seccion={}&nombre={}",
        session.url(STANDARD_DETAIL_PATH),
        row_index,
        encode(&args.student_id),
        encode(&args.subject_code),
        encode(&args.year),
        encode(&args.period),
        encode(&args.section),
        encode(&args.name)
    );
    session.http().get_text(&url).await
}

async fn fetch_modular_detail(session: &Session, args: &ModularArgs, records: &RecordsForm) -> Result<String> {
    let form = [
        ("agn_codigo", args.subject_code.as_str()),
        ("seccion", args.section.as_str()),
        ("ano", args.year.as_str()),
        ("periodo", args.period.as_str()),
        ("alu_rut", records.student_id.as_str()),
        ("crr_codigo", records.program_code.as_str()),
        ("pca_codigo", records.plan_code.as_str()),
        ("alc_ano_ingreso", records.admission_year.as_str()),
        ("alc_periodo", records.admission_period.as_str()),
    ];
    session.http().post_text(&session.url(MODULAR_DETAIL_PATH), &form).await
}

// Shape of one top-level evaluation as declared in the weights table.
struct EvaluationShape {
    name: String,
    weight: u32,
    subs: Vec<(String, u32)>,
}

// Builds the evaluation tree from the "Ponderaciones" table, then fills it from the
// "Calificaciones" cells in document order.
pub fn parse_standard(course: &str, html: &str) -> Result<Vec<Evaluation>> {
    let document = Html::parse_document(html);

    let mut shapes: Vec<EvaluationShape> = Vec::new();
    for block in siblings_after_heading(&document, "Ponderaciones", "div") {
        for row in block.select(&TABLE_ROWS) {
            if row.select(&BOOK_ICON).next().is_some() {
                let (name, weight) = weight_row(course, &row)?;
                shapes.push(EvaluationShape { name, weight, subs: Vec::new() });
            } else if row.select(&CHEVRON_ICON).next().is_some() {
                // a sub-item before any evaluation has nothing to attach to
                if let Some(current) = shapes.last_mut() {
                    current.subs.push(weight_row(course, &row)?);
                }
            }
        }
    }

    let grade_cells: Vec<Option<f64>> = siblings_after_heading(&document, "Calificaciones", "div")
        .iter()
        .flat_map(|block| block.select(&GRADE_CELLS).map(|cell| parse_grade(&element_text(&cell))).collect::<Vec<_>>())
        .collect();
    let mut grades = grade_cells.into_iter();

    let evaluations = shapes
        .into_iter()
        .map(|shape| {
            if shape.subs.is_empty() {
                Evaluation::graded(&shape.name, shape.weight, grades.next().flatten())
            } else {
                let subs = shape
                    .subs
                    .into_iter()
                    .map(|(name, weight_factor)| SubEvaluation { name, weight_factor, grade: grades.next().flatten() })
                    .collect();
                Evaluation::from_subs(&shape.name, shape.weight, subs)
            }
        })
        .collect();

    Ok(evaluations)
}

// Picks the last module whose table has rows; each 4-cell row is `name, -, weight, grade`.
// Rows that do not parse that way are footers and are dropped.
pub fn parse_modular(course: &str, html: &str) -> Vec<Evaluation> {
    let document = Html::parse_document(html);

    let active = headings(&document, "Calificaciones MÓDULO").into_iter().rev().find_map(|heading| {
        next_element(&heading)
            .filter(|container| container.select(&BODY_ROWS).next().is_some())
            .map(|container| (element_text(&heading), container))
    });

    let (module, container) = match active {
        Some(found) => found,
        None => {
            debug!("{}: no module with grades", course);
            return Vec::new();
        }
    };
    debug!("{}: averaging {}", course, module);

    container
        .select(&BODY_ROWS)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&CELL).map(|cell| element_text(&cell)).collect();
            if cells.len() != 4 {
                return None;
            }
            let weight = cells[2].parse::<u32>().ok()?;
            let grade = cells[3].replace(',', ".").parse::<f64>().ok()?;
            Some(Evaluation::graded(&cells[0], weight, Some(grade)))
        })
        .collect()
}

// Sum of grade * weight over graded evaluations, over a fixed 100: ungraded work counts as zero.
pub fn projected_average(course: &str, evaluations: &[Evaluation]) -> f64 {
    let total: f64 = evaluations
        .iter()
        .filter(|evaluation| evaluation.contributes())
        .map(|evaluation| {
            let contribution = evaluation.final_grade * evaluation.weight_factor as f64;
            debug!(
                "{}: {} grade {:.2} * weight {} = {:.2}",
                course, evaluation.name, evaluation.final_grade, evaluation.weight_factor, contribution
            );
            contribution
        })
        .sum();

    let average = total / 100.0;
    debug!("{}: {} / 100 = {}", course, total, average);
    average
}

// Weighted mean over the evaluations that have both a weight and a grade.
pub fn module_average(course: &str, evaluations: &[Evaluation]) -> f64 {
    let (total, weights) = evaluations
        .iter()
        .filter(|evaluation| evaluation.contributes())
        .fold((0.0, 0.0), |(total, weights), evaluation| {
            let weight = evaluation.weight_factor as f64;
            (total + evaluation.final_grade * weight, weights + weight)
        });

    let average = if weights > 0.0 { total / weights } else { 0.0 };
    debug!("{}: {} / {} = {}", course, total, weights, average);
    average
}

fn weight_row(course: &str, row: &ElementRef) -> Result<(String, u32)> {
    let cells: Vec<String> = row.select(&CELL).map(|cell| element_text(&cell)).collect();
    if cells.len() < 3 {
        return Err(PortalError::course(course, format!("weights row has {} cells", cells.len())));
    }

    let weight = cells[2]
        .parse::<u32>()
        .map_err(|_| PortalError::course(course, format!("weight {:?} is not a number", cells[2])))?;

    Ok((cells[0].clone(), weight))
}

// Grades use a decimal comma. Empty or unreadable cells have no grade yet.
fn parse_grade(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.replace(',', ".").parse::<f64>().ok()
}
