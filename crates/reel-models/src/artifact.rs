//! Output artifact naming.

use crate::job::Orientation;

/// Replace path separators and colons so a title is safe inside a filename.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect()
}

/// `{user_id}_{project_id}_{sanitized_title}_{orientation}.mp4`
pub fn clip_filename(user_id: &str, project_id: &str, title: &str, orientation: Orientation) -> String {
    format!(
        "{}_{}_{}_{}.mp4",
        user_id,
        project_id,
        sanitize_title(title),
        orientation
    )
}

/// `{user_id}/{project_id}/{filename}`
pub fn clip_object_key(user_id: &str, project_id: &str, filename: &str) -> String {
    format!("{}/{}/{}", user_id, project_id, filename)
}
