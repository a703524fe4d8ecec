/// A blank part file listing every submission, ready for graders to fill in.
pub fn skeleton(title: &str, submissions: &[(String, String)]) -> String {
    let mut text = format!("# {title}\n\n# Rubric\n\n# Grades\n");
    for (entity, url) in submissions {
        text.push_str(&format!("\n## [`{entity}`]({url})\n\n**Grader:** ``\n"));
    }
    text
}
