//! `todoclaw tools`: Show the tool table the model sees.

use todoclaw_core::tool::tool_specs;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render());
    Ok(())
}

fn render() -> String {
    let mut out = String::new();
    for spec in tool_specs() {
        out.push_str(&format!("{}\n    {}\n", spec.name, spec.description));
        for param in spec.params {
            let mut line = format!("    - {} ({})", param.name, param.ty.json_type());
            if param.required {
                line.push_str(" required");
            }
            if !param.allowed.is_empty() {
                line.push_str(&format!(" one of [{}]", param.allowed.join(", ")));
            }
            if let Some(default) = param.default {
                line.push_str(&format!(" default {default}"));
            }
            out.push_str(&line);
            out.push('\n');
        }
        if !spec.at_least_one_of.is_empty() {
            out.push_str(&format!("    at least one of: {}\n", spec.at_least_one_of.join(", ")));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_tool() {
        let table = render();
        for name in [
            "create_todo",
            "list_todos",
            "get_todo",
            "update_todo",
            "delete_todo",
            "toggle_todo_complete",
        ] {
            assert!(table.contains(name), "missing {name}");
        }
        assert!(table.contains("one of [name, creation_date, due_date]"));
        assert!(table.contains("default desc"));
    }
}
