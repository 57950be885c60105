use super::*;

pub(super) fn group_size_from_row(row: &Row) -> Result<Option<Size>, StorageError> {
    let width: Option<f64> = row.get(0)?;
    let height: Option<f64> = row.get(1)?;
    Ok(match (width, height) {
        (Some(width), Some(height)) => Some(Size::new(width as f32, height as f32)),
        _ => None,
    })
}

pub(super) fn child_position_from_row(row: &Row) -> Result<(NodeId, Vec2), StorageError> {
    let child_id: String = row.get(0)?;
    let x: f64 = row.get(1)?;
    let y: f64 = row.get(2)?;
    Ok((NodeId::from(child_id), Vec2::new(x as f32, y as f32)))
}

pub(super) fn timestamp_from_row(
    row: &Row,
    column: usize,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(StorageError::from)
    })
    .transpose()
}
