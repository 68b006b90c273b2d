//! The single page served at `/`.

pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Detección de Agentes Plaga en Tomate</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, 'Segoe UI', Roboto, Ubuntu, sans-serif;
            background: #f4f6f3;
            color: #2b2b2b;
            padding: 24px;
        }
        h1 { text-align: center; font-size: 1.5em; margin-bottom: 24px; }
        h2 { font-size: 1.1em; margin-bottom: 12px; }
        .panel {
            background: white;
            border-radius: 10px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.08);
            max-width: 900px;
            margin: 0 auto 24px;
            padding: 24px;
        }
        .upload-area {
            border: 2px dashed #b23b3b;
            border-radius: 8px;
            padding: 36px 16px;
            text-align: center;
            cursor: pointer;
            color: #b23b3b;
        }
        .upload-area.dragover { background: #fbeeee; }
        input[type="file"] { display: none; }
        img.result { max-width: 100%; border-radius: 8px; margin-top: 16px; }
        table { border-collapse: collapse; margin-top: 12px; width: 100%; }
        th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
        .hidden { display: none; }
        .error { color: #b23b3b; margin-top: 12px; }
        .ok { color: #2b7a3b; margin-top: 12px; }
        label { display: block; margin-top: 10px; }
        input[type="text"], input[type="email"], textarea {
            width: 100%; padding: 8px; margin-top: 4px;
            border: 1px solid #ccc; border-radius: 6px;
        }
        button {
            margin-top: 14px; padding: 10px 18px; border: none;
            border-radius: 6px; background: #b23b3b; color: white; cursor: pointer;
        }
        .decor { display: flex; gap: 16px; justify-content: center; }
        .decor img { max-width: 45%; border-radius: 8px; }
    </style>
</head>
<body>
    <h1>Sistema de Detección de Agentes Plaga en la Producción de Tomate 🍅</h1>

    <div class="panel">
        <h2>Subir imagen</h2>
        <div class="upload-area" id="uploadArea">
            Haz clic o arrastra una imagen (jpg, jpeg, png)
            <input type="file" id="fileInput" accept=".jpg,.jpeg,.png">
        </div>
        <div id="detectError" class="error hidden"></div>
        <div id="results" class="hidden">
            <img id="annotated" class="result" alt="Imagen procesada">
            <h2>Detecciones por Clase</h2>
            <table>
                <thead><tr><th>Plaga</th><th>Cantidad</th><th>Porcentaje</th></tr></thead>
                <tbody id="countsBody"></tbody>
            </table>
            <p id="noDetections" class="ok hidden">Sin detecciones en esta imagen.</p>
            <a id="reportLink" class="hidden" href="#"><button>Descargar Informe PDF</button></a>
        </div>
    </div>

    <div class="panel">
        <h2>Plagas registradas</h2>
        <div id="aggregateEmpty" class="hidden">No se encontraron datos registrados.</div>
        <img id="chart" class="result hidden" alt="Cantidad de plagas detectadas">
    </div>

    <div class="panel">
        <h2>Escríbenos 📝</h2>
        <p>Si tienes alguna duda sobre el funcionamiento del sistema, deja tu
        mensaje en el formulario y te responderemos a la brevedad.</p>
        <form id="contactForm">
            <label>Nombre<input type="text" id="contactName"></label>
            <label>Correo Electrónico<input type="email" id="contactEmail"></label>
            <label>Asunto<input type="text" id="contactSubject"></label>
            <label>Mensaje<textarea id="contactMessage" rows="5"></textarea></label>
            <button type="submit">Enviar</button>
        </form>
        <div id="contactStatus"></div>
    </div>

    <div class="panel decor">
        <img src="/assets/fondo_tesis.png" alt="">
        <img src="/assets/secretaria.png" alt="">
    </div>

    <script>
        const uploadArea = document.getElementById('uploadArea');
        const fileInput = document.getElementById('fileInput');

        uploadArea.addEventListener('click', () => fileInput.click());
        uploadArea.addEventListener('dragover', (e) => {
            e.preventDefault();
            uploadArea.classList.add('dragover');
        });
        uploadArea.addEventListener('dragleave', () => uploadArea.classList.remove('dragover'));
        uploadArea.addEventListener('drop', (e) => {
            e.preventDefault();
            uploadArea.classList.remove('dragover');
            if (e.dataTransfer.files[0]) uploadImage(e.dataTransfer.files[0]);
        });
        fileInput.addEventListener('change', (e) => {
            if (e.target.files[0]) uploadImage(e.target.files[0]);
        });

        async function uploadImage(file) {
            const errorBox = document.getElementById('detectError');
            errorBox.classList.add('hidden');
            try {
                const response = await fetch('/detect', {
                    method: 'POST',
                    headers: { 'X-Filename': file.name },
                    body: file,
                });
                if (!response.ok) {
                    const payload = await response.json().catch(() => ({}));
                    throw new Error(payload.error || 'detección fallida');
                }
                showResults(await response.json());
                refreshAggregate();
            } catch (err) {
                errorBox.textContent = 'Error: ' + err.message;
                errorBox.classList.remove('hidden');
            }
        }

        function showResults(result) {
            document.getElementById('results').classList.remove('hidden');
            document.getElementById('annotated').src =
                'data:image/png;base64,' + result.annotated_png_base64;

            const body = document.getElementById('countsBody');
            body.innerHTML = '';
            for (const [name, count] of Object.entries(result.counts)) {
                const pct = result.percentages ? result.percentages[name] : '';
                const row = document.createElement('tr');
                row.innerHTML = `<td>${name}</td><td>${count}</td><td>${pct}</td>`;
                body.appendChild(row);
            }
            document.getElementById('noDetections')
                .classList.toggle('hidden', result.total > 0);

            const reportLink = document.getElementById('reportLink');
            if (result.report_url) {
                reportLink.href = result.report_url;
                reportLink.classList.remove('hidden');
            } else {
                reportLink.classList.add('hidden');
            }
        }

        async function refreshAggregate() {
            const rows = await (await fetch('/aggregate')).json();
            const empty = rows.length === 0;
            document.getElementById('aggregateEmpty').classList.toggle('hidden', !empty);
            const chart = document.getElementById('chart');
            chart.classList.toggle('hidden', empty);
            if (!empty) chart.src = '/chart.png?t=' + Date.now();
        }

        document.getElementById('contactForm').addEventListener('submit', async (e) => {
            e.preventDefault();
            const status = document.getElementById('contactStatus');
            const payload = {
                name: document.getElementById('contactName').value,
                email: document.getElementById('contactEmail').value,
                subject: document.getElementById('contactSubject').value,
                message: document.getElementById('contactMessage').value,
            };
            const response = await fetch('/contact', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(payload),
            });
            if (response.ok) {
                status.className = 'ok';
                status.textContent = '¡Correo enviado exitosamente!';
            } else {
                const body = await response.json().catch(() => ({}));
                status.className = 'error';
                status.textContent = body.error === 'fields_incomplete'
                    ? 'Por favor, completa todos los campos del formulario.'
                    : 'Error al enviar el correo.';
            }
        });

        refreshAggregate();
    </script>
</body>
</html>
"##;
