use crate::{
    data::grade::percentage,
    error::{
        MakeQuerySnafu, MissingFormFieldSnafu, ParseDateSnafu, ParseEnumSnafu, ParseUuidSnafu,
        SchoolError, SchoolResult,
    },
};
use chrono::NaiveDate;
use snafu::{OptionExt, ResultExt};
use sqlx::{PgConnection, Pool, Postgres};
use std::{collections::HashMap, fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub const ALL: [Self; 3] = [Self::Present, Self::Absent, Self::Late];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| {
                ParseEnumSnafu {
                    kind: "attendance status",
                    provided: s,
                }
                .build()
            })
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: String,
    pub marked_by: Option<Uuid>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

impl AttendanceSummary {
    pub const fn total(&self) -> i64 {
        self.present + self.absent + self.late
    }

    ///share of days marked present, `None` before any attendance has been taken
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> Option<i64> {
        percentage(self.present as f64, self.total() as f64)
    }

    pub fn display_percentage(&self) -> String {
        self.percentage()
            .map_or_else(|| "N/A".to_string(), |p| format!("{p}%"))
    }
}

///one submission of the register for a class on a day
#[derive(Debug)]
pub struct AttendanceSheet {
    pub class_name: String,
    pub section: String,
    pub date: NaiveDate,
    pub entries: Vec<(Uuid, AttendanceStatus)>,
}

impl AttendanceSheet {
    ///statuses arrive as `status_<student id>=present`
    pub fn from_pairs(pairs: Vec<(String, String)>) -> SchoolResult<Self> {
        let mut class_name = String::new();
        let mut section = String::new();
        let mut date = None;
        let mut entries = vec![];

        for (key, value) in pairs {
            match key.as_str() {
                "class_name" => class_name = value.trim().to_string(),
                "section" => section = value.trim().to_uppercase(),
                "date" => {
                    date = Some(
                        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                            .context(ParseDateSnafu { original: value })?,
                    );
                }
                _ => {
                    if let Some(raw_id) = key.strip_prefix("status_") {
                        let id = Uuid::from_str(raw_id).context(ParseUuidSnafu {
                            original: raw_id,
                        })?;
                        entries.push((id, value.parse()?));
                    }
                }
            }
        }

        let date = date.context(MissingFormFieldSnafu { field: "date" })?;

        Ok(Self {
            class_name,
            section,
            date,
            entries,
        })
    }
}

impl AttendanceRecord {
    pub fn status(&self) -> Option<AttendanceStatus> {
        self.status.parse().ok()
    }

    ///one record per student per day, so re-submitting the register overwrites it
    pub async fn mark(
        sheet: &AttendanceSheet,
        marked_by: Uuid,
        conn: &mut PgConnection,
    ) -> SchoolResult<u64> {
        let mut written = 0;
        for (student_id, status) in &sheet.entries {
            written += sqlx::query(
                "INSERT INTO attendance (student_id, date, status, marked_by) VALUES ($1, $2, $3, $4) ON CONFLICT (student_id, date) DO UPDATE SET status = excluded.status, marked_by = excluded.marked_by",
            )
            .bind(student_id)
            .bind(sheet.date)
            .bind(status.as_str())
            .bind(marked_by)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();
        }

        info!(%marked_by, date = %sheet.date, class_name = %sheet.class_name, section = %sheet.section, written, "Marked attendance");
        Ok(written)
    }

    pub async fn get_for_class_on(
        class_name: &str,
        section: &str,
        date: NaiveDate,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<HashMap<Uuid, AttendanceStatus>> {
        let records = sqlx::query_as::<_, Self>(
            "SELECT a.* FROM attendance a JOIN students s ON s.id = a.student_id WHERE s.class_name = $1 AND upper(s.section) = upper($2) AND a.date = $3",
        )
        .bind(class_name.trim())
        .bind(section.trim())
        .bind(date)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)?;

        Ok(records
            .into_iter()
            .filter_map(|record| record.status().map(|status| (record.student_id, status)))
            .collect())
    }

    pub async fn summary_for_student(
        student_id: Uuid,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<AttendanceSummary> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, count(*) FROM attendance WHERE student_id = $1 GROUP BY status",
        )
        .bind(student_id)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)?;

        Ok(summarise(counts))
    }
}

fn summarise(counts: Vec<(String, i64)>) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for (status, count) in counts {
        match status.parse() {
            Ok(AttendanceStatus::Present) => summary.present += count,
            Ok(AttendanceStatus::Absent) => summary.absent += count,
            Ok(AttendanceStatus::Late) => summary.late += count,
            Err(e) => warn!(?e, "Unknown attendance status in database"),
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_records_is_not_a_percentage() {
        let summary = AttendanceSummary::default();
        assert_eq!(summary.percentage(), None);
        assert_eq!(summary.display_percentage(), "N/A");
    }

    #[test]
    fn only_present_days_count() {
        let summary = summarise(vec![
            ("present".into(), 17),
            ("late".into(), 2),
            ("absent".into(), 1),
        ]);
        assert_eq!(summary.total(), 20);
        assert_eq!(summary.percentage(), Some(85));
        assert_eq!(summary.display_percentage(), "85%");
    }

    #[test]
    fn register_is_read_from_pairs() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let sheet = AttendanceSheet::from_pairs(vec![
            ("class_name".into(), "7".into()),
            ("section".into(), "b".into()),
            ("date".into(), "2025-02-03".into()),
            (format!("status_{first}"), "present".into()),
            (format!("status_{second}"), "Late".into()),
        ])
        .expect("valid register");

        assert_eq!(sheet.section, "B");
        assert_eq!(sheet.date, NaiveDate::from_ymd_opt(2025, 2, 3).unwrap());
        assert_eq!(
            sheet.entries,
            vec![
                (first, AttendanceStatus::Present),
                (second, AttendanceStatus::Late)
            ]
        );
    }

    #[test]
    fn register_rejects_bad_input() {
        assert!(AttendanceSheet::from_pairs(vec![("class_name".into(), "7".into())]).is_err());
        assert!(
            AttendanceSheet::from_pairs(vec![
                ("date".into(), "2025-02-03".into()),
                ("status_not-a-uuid".into(), "present".into()),
            ])
            .is_err()
        );
        assert!(
            AttendanceSheet::from_pairs(vec![
                ("date".into(), "2025-02-03".into()),
                (format!("status_{}", Uuid::nil()), "sick".into()),
            ])
            .is_err()
        );
    }
}
