use std::sync::LazyLock;
use scraper::{Html, Selector};
use crate::models::CourseRow;
use crate::utils::html::element_text;

static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.table.table-hover tbody tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static GRADES_TRIGGER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span[title='Ver Calificaciones']").unwrap());

// Parses the per-course rows of a career records page, keeping the source order.
// Rows whose first cell is empty are skipped and do not consume an index.
pub fn parse_course_rows(html: &str) -> Vec<CourseRow> {
    let document = Html::parse_document(html);
    let mut courses = Vec::new();

    for row in document.select(&ROWS) {
        let course_name = match row.select(&CELL).next() {
            Some(cell) => element_text(&cell),
            None => continue,
        };
        if course_name.is_empty() {
            continue;
        }

        // The trigger's inline handler names the detail endpoint and its arguments.
        let detail_link_payload = row
            .select(&GRADES_TRIGGER)
            .next()
            .map(|trigger| trigger.value().attr("onclick").unwrap_or("").to_string());

        courses.push(CourseRow { course_name, detail_link_payload, row_index: courses.len() });
    }

    courses
}
