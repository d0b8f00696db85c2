//! Cross-file parameter names: replace generic `arg0`, `arg1`, … with
//! the callee's declared parameter names from `symbols.parameters_json`.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::FxHashMap;

pub fn resolve_parameter_names(
    conn: &Connection,
    ambiguous: &mut Vec<String>,
) -> Result<usize, StoreError> {
    // Declared parameter lists by function name; multiple declarations
    // under the same name make the name ambiguous.
    let mut declared: FxHashMap<String, Vec<(String, Vec<String>)>> = FxHashMap::default();
    {
        let mut stmt = conn
            .prepare_cached(
                "SELECT path, name, parameters_json FROM symbols
                 WHERE kind = 'function' AND parameters_json IS NOT NULL
                 ORDER BY path, name",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(StoreError::sqlite)?;
        for row in rows {
            let (path, name, params_json) = row.map_err(StoreError::sqlite)?;
            let Ok(params) = serde_json::from_str::<Vec<serde_json::Value>>(&params_json) else {
                continue;
            };
            let names: Vec<String> = params
                .iter()
                .filter_map(|p| p.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .collect();
            // Base name: `UserController.create` is callable as `create`.
            let base = name.rsplit('.').next().unwrap_or(&name).to_string();
            declared.entry(base).or_default().push((path.clone(), names.clone()));
            if name.contains('.') {
                declared.entry(name).or_default().push((path, names));
            }
        }
    }

    let generic_rows: Vec<(i64, String, String, Option<String>, i64)> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rowid, file, callee_function, callee_file_path, argument_index
                 FROM function_call_args
                 WHERE param_name LIKE 'arg%'
                 ORDER BY rowid",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        out
    };

    let mut update = conn
        .prepare_cached("UPDATE function_call_args SET param_name = ?1 WHERE rowid = ?2")
        .map_err(StoreError::sqlite)?;

    let mut resolved = 0usize;
    for (rowid, _file, callee, callee_file, argument_index) in generic_rows {
        let base = callee.rsplit('.').next().unwrap_or(&callee);
        let Some(candidates) = declared.get(base).or_else(|| declared.get(&callee)) else {
            continue;
        };

        // Prefer the declaration in the resolved callee file; otherwise
        // the binding must be unique.
        let chosen = match &callee_file {
            Some(path) => candidates.iter().find(|(p, _)| p == path),
            None if candidates.len() == 1 => candidates.first(),
            None => {
                ambiguous.push(format!("param binding for {callee} ({} declarations)", candidates.len()));
                continue;
            }
        };
        let Some((_, names)) = chosen else { continue };

        if let Some(name) = names.get(argument_index as usize) {
            update
                .execute(rusqlite::params![name, rowid])
                .map_err(StoreError::sqlite)?;
            resolved += 1;
        }
    }

    Ok(resolved)
}
