//! HTML страница генератора

use std::collections::HashMap;

use qr_art_core::{BlendMode, PerformanceMode, Readability};

use crate::form::{FormValues, Mode};

const PAGE: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>QR Art Generator</title>
    <style>
      :root { --bg: #0f1115; --panel: #181b22; --text: #e8eaf0; --muted: #8a90a0; --accent: #5b8cff; }
      * { box-sizing: border-box; }
      body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); }
      .wrap { max-width: 1100px; margin: 0 auto; padding: 24px; display: grid; grid-template-columns: 1fr 1fr; gap: 24px; }
      .card { background: var(--panel); border-radius: 12px; padding: 20px; }
      label { display: block; font-size: 12px; color: var(--muted); margin: 12px 0 4px; }
      input, select, textarea { width: 100%; padding: 8px; border-radius: 6px; border: 1px solid #2a2f3a; background: #11141a; color: var(--text); }
      .row { display: grid; grid-template-columns: 1fr 1fr; gap: 12px; }
      .modes { display: flex; gap: 8px; margin-bottom: 12px; }
      .mode-btn { flex: 1; padding: 10px; border-radius: 8px; border: 1px solid #2a2f3a; background: none; color: var(--text); cursor: pointer; }
      .mode-btn.active { background: var(--accent); border-color: var(--accent); }
      .go { margin-top: 18px; width: 100%; padding: 12px; border: 0; border-radius: 8px; background: var(--accent); color: white; font-weight: 600; cursor: pointer; }
      .error { background: #3a1d22; color: #ff9aa5; padding: 10px; border-radius: 8px; margin-bottom: 12px; }
      .imgbox { min-height: 320px; display: flex; align-items: center; justify-content: center; }
      .imgbox img { max-width: 100%; border-radius: 8px; }
      .dl { display: inline-block; margin-top: 12px; color: var(--accent); }
      #overlay { display: none; position: fixed; inset: 0; background: rgba(0,0,0,.7); align-items: center; justify-content: center; flex-direction: column; }
      .bar { width: 320px; height: 8px; background: #2a2f3a; border-radius: 4px; overflow: hidden; margin: 12px 0; }
      #progress-bar { height: 100%; width: 0; background: var(--accent); }
      @media (max-width: 800px) { .wrap { grid-template-columns: 1fr; } }
    </style>
  </head>
  <body>
    <div id="overlay">
      <div id="status">Working...</div>
      <div class="bar"><div id="progress-bar"></div></div>
      <button id="cancel-btn" class="mode-btn" type="button" onclick="cancelGeneration()">Cancel</button>
    </div>
    <div class="wrap">
      <div class="card">
        <div class="modes">
          <button type="button" class="mode-btn" id="btn-ai" onclick="setMode('ai')">AI ControlNet</button>
          <button type="button" class="mode-btn" id="btn-classic" onclick="setMode('classic')">Classic</button>
        </div>
        {{error}}
        <form id="qr-form" method="post" action="/generate" enctype="multipart/form-data" onsubmit="submitForm(event)">
          <input type="hidden" name="mode" id="mode-input" value="{{mode}}" />
          <input type="hidden" name="seed" id="seed-input" value="{{seed}}" />
          <label>QR data</label>
          <input name="data" type="text" value="{{data}}" required />

          <div id="ai-controls">
            <label>Prompt</label>
            <textarea name="prompt" rows="3" placeholder="a futuristic city with neon lights">{{prompt}}</textarea>
            <label>Readability</label>
            <select name="readability">
              <option value="hidden" {{readability_hidden}}>Hidden (smart adaptive)</option>
              <option value="balanced" {{readability_balanced}}>Balanced</option>
              <option value="scannable" {{readability_scannable}}>Scannable</option>
            </select>
            <label>Negative prompt</label>
            <input name="negative_prompt" type="text" value="{{negative_prompt}}" />
            <div class="row">
              <div>
                <label>ControlNet scale</label>
                <input name="cn_scale" type="number" step="0.05" min="0.5" max="2.0" value="{{cn_scale}}" />
              </div>
              <div>
                <label>Performance</label>
                <select name="performance_mode">
                  <option value="balanced" {{performance_balanced}}>Balanced</option>
                  <option value="eco" {{performance_eco}}>Eco (CPU offload)</option>
                </select>
              </div>
              <div>
                <label>Guidance scale</label>
                <input name="guidance_scale" type="number" step="0.5" min="1.0" max="20.0" value="{{guidance_scale}}" />
              </div>
              <div>
                <label>Control end</label>
                <input name="control_end" type="number" step="0.05" min="0.0" max="1.0" value="{{control_end}}" />
              </div>
            </div>
          </div>

          <div id="classic-controls">
            <label>Background image</label>
            <input name="image" type="file" accept="image/*" />
            <div class="row">
              <div>
                <label>Style</label>
                <select name="classic_mode">
                  <option value="organic" {{classic_organic}}>Organic</option>
                  <option value="sharp" {{classic_sharp}}>Sharp</option>
                </select>
              </div>
              <div>
                <label>Size (px)</label>
                <input name="size" type="number" min="256" max="2048" step="64" value="{{size}}" />
              </div>
              <div>
                <label>Border (modules)</label>
                <input name="border" type="number" min="0" max="10" value="{{border}}" />
              </div>
              <div>
                <label>Rounded corners</label>
                <input name="rounded" type="number" min="0" max="160" step="1" value="{{rounded}}" />
              </div>
              <div>
                <label>Dark color</label>
                <input name="dark" type="color" value="{{dark}}" />
              </div>
              <div>
                <label>Light color</label>
                <input name="light" type="color" value="{{light}}" />
              </div>
              <div>
                <label>Dark alpha</label>
                <input name="dark_alpha" type="number" min="0" max="1" step="0.01" value="{{dark_alpha}}" />
              </div>
              <div>
                <label>Light alpha</label>
                <input name="light_alpha" type="number" min="0" max="1" step="0.01" value="{{light_alpha}}" />
              </div>
              <div>
                <label>Strength</label>
                <input name="strength" type="number" min="0" max="2" step="0.05" value="{{strength}}" />
              </div>
              <div>
                <label>Texture</label>
                <input name="texture" type="number" min="0" max="1" step="0.05" value="{{texture}}" />
              </div>
            </div>
            <label><input name="preserve_finders" type="checkbox" value="1" {{preserve_finders}} style="width:auto" /> Keep finder patterns crisp</label>
          </div>

          <button class="go" type="submit">Generate QR Art</button>
        </form>
      </div>
      <div class="card">
        <div class="imgbox" id="imgbox">{{result}}</div>
      </div>
    </div>
    <script>
      let currentTaskId = null;
      let pollTimer = null;

      function setMode(mode) {
        const input = document.getElementById('mode-input');
        const classic = document.querySelector('[name=classic_mode]').value;
        input.value = mode === 'ai' ? 'ai' : classic;
        document.getElementById('btn-ai').classList.toggle('active', mode === 'ai');
        document.getElementById('btn-classic').classList.toggle('active', mode !== 'ai');
        document.getElementById('ai-controls').style.display = mode === 'ai' ? 'block' : 'none';
        document.getElementById('classic-controls').style.display = mode === 'ai' ? 'none' : 'block';
      }

      function showOverlay(text, withProgress) {
        document.getElementById('overlay').style.display = 'flex';
        document.getElementById('status').innerText = text;
        document.getElementById('progress-bar').style.width = '0%';
        document.getElementById('cancel-btn').style.display = withProgress ? 'block' : 'none';
      }

      function hideOverlay() {
        document.getElementById('overlay').style.display = 'none';
        if (pollTimer) clearInterval(pollTimer);
      }

      function showResult(b64) {
        const src = 'data:image/png;base64,' + b64;
        document.getElementById('imgbox').innerHTML =
          '<div><img alt="QR Art" src="' + src + '" /><br /><a class="dl" download="qr-art.png" href="' + src + '">Download PNG</a></div>';
      }

      async function submitForm(event) {
        const input = document.getElementById('mode-input');
        if (input.value !== 'ai') {
          input.value = document.querySelector('[name=classic_mode]').value;
          showOverlay('Rendering...', false);
          return;
        }
        event.preventDefault();
        const seed = document.getElementById('seed-input');
        if (!seed.value || seed.value === '-1') seed.value = Math.floor(Math.random() * 1000000000);
        showOverlay('Starting...', true);
        try {
          const res = await fetch('/generate_ai', { method: 'POST', body: new FormData(event.target) });
          const body = await res.json();
          if (body.error) throw new Error(body.error);
          currentTaskId = body.task_id;
          pollProgress(currentTaskId);
        } catch (e) {
          alert('Error: ' + e.message);
          hideOverlay();
        }
        seed.value = '';
      }

      function pollProgress(taskId) {
        if (pollTimer) clearInterval(pollTimer);
        pollTimer = setInterval(async () => {
          try {
            const res = await fetch('/progress/' + taskId);
            const task = await res.json();
            if (task.status === 'completed') {
              showResult(task.result);
              hideOverlay();
            } else if (task.status === 'failed') {
              alert('Generation failed: ' + task.error);
              hideOverlay();
            } else if (task.status === 'cancelled' || task.error) {
              hideOverlay();
            } else {
              document.getElementById('progress-bar').style.width = task.progress + '%';
              document.getElementById('status').innerText =
                task.status === 'pending' ? 'Waiting in queue...' : 'Step ' + task.step + '/' + task.total;
            }
          } catch (e) {
            console.error(e);
          }
        }, 1000);
      }

      async function cancelGeneration() {
        if (!currentTaskId) return;
        await fetch('/cancel/' + currentTaskId, { method: 'POST' });
        document.getElementById('status').innerText = 'Cancelling...';
        document.getElementById('cancel-btn').style.display = 'none';
      }

      setMode('{{initial_mode}}');
    </script>
  </body>
</html>
"#;

/// Экранирование для текста и атрибутов HTML
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn flag(on: bool, attr: &str) -> String {
    if on {
        attr.to_string()
    } else {
        String::new()
    }
}

/// Страница с формой, результатом (PNG в base64) или ошибкой
pub fn render_page(values: &FormValues, image_b64: Option<&str>, error: Option<&str>) -> String {
    let selected = |on: bool| flag(on, "selected");
    let classic_mode = match values.mode {
        Mode::Classic(mode) => mode,
        Mode::Ai => BlendMode::Organic,
    };

    let result = match image_b64 {
        Some(b64) => format!(
            r#"<div><img alt="QR Art" src="data:image/png;base64,{b64}" /><br /><a class="dl" download="qr-art.png" href="data:image/png;base64,{b64}">Download PNG</a></div>"#
        ),
        None => r#"<div style="color: var(--muted)">Your QR art will appear here</div>"#.to_string(),
    };
    let error = error
        .map(|e| format!(r#"<div class="error">{}</div>"#, escape(e)))
        .unwrap_or_default();
    let initial_mode = if values.mode == Mode::Ai { "ai" } else { "classic" };

    let seed = if values.seed >= 0 {
        values.seed.to_string()
    } else {
        String::new()
    };

    let vars: HashMap<&str, String> = HashMap::from([
        ("error", error),
        ("result", result),
        ("mode", values.mode.as_str().to_string()),
        ("initial_mode", initial_mode.to_string()),
        ("seed", seed),
        ("data", escape(&values.data)),
        ("prompt", escape(&values.prompt)),
        ("negative_prompt", escape(&values.negative_prompt)),
        ("readability_hidden", selected(values.readability == Readability::Hidden)),
        ("readability_balanced", selected(values.readability == Readability::Balanced)),
        ("readability_scannable", selected(values.readability == Readability::Scannable)),
        ("performance_balanced", selected(values.performance == PerformanceMode::Balanced)),
        ("performance_eco", selected(values.performance == PerformanceMode::Eco)),
        ("classic_organic", selected(classic_mode == BlendMode::Organic)),
        ("classic_sharp", selected(classic_mode == BlendMode::Sharp)),
        ("preserve_finders", flag(values.preserve_finders, "checked")),
        ("cn_scale", format!("{:.2}", values.cn_scale)),
        ("guidance_scale", format!("{:.1}", values.guidance_scale)),
        ("control_end", format!("{:.2}", values.control_end)),
        ("size", values.size.to_string()),
        ("border", values.border.to_string()),
        ("rounded", values.rounded.to_string()),
        ("dark", escape(&values.dark)),
        ("light", escape(&values.light)),
        ("dark_alpha", format!("{:.2}", values.dark_alpha)),
        ("light_alpha", format!("{:.2}", values.light_alpha)),
        ("strength", format!("{:.2}", values.strength)),
        ("texture", format!("{:.2}", values.texture)),
    ]);

    fill(PAGE, &vars)
}

/// Подстановка `{{name}}` за один проход: значения повторно не разбираются
fn fill(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len() + 1024);
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        log::warn!("Unknown page placeholder: {}", name);
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
